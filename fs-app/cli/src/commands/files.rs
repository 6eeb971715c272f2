//! File commands

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use metafs::FileSystemManager;

use super::print_json;

/// A single virtual path
#[derive(Parser)]
pub struct PathArgs {
    /// Virtual path, e.g. /docs/readme.txt
    pub path: String,
}

/// A virtual path plus the content to store there
#[derive(Parser)]
pub struct ContentArgs {
    /// Virtual path, e.g. /docs/readme.txt
    pub path: String,

    /// Content as a literal string
    #[arg(conflicts_with_all = ["from_file", "stdin"])]
    pub content: Option<String>,

    /// Read content from a local file
    #[arg(short = 'f', long = "from-file")]
    pub from_file: Option<PathBuf>,

    /// Read content from standard input
    #[arg(long, conflicts_with = "from_file")]
    pub stdin: bool,
}

impl ContentArgs {
    fn content(&self) -> Result<Vec<u8>> {
        if let Some(content) = &self.content {
            return Ok(content.as_bytes().to_vec());
        }
        if let Some(path) = &self.from_file {
            return std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()));
        }
        if self.stdin {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("Failed to read standard input")?;
            return Ok(buf);
        }
        Ok(Vec::new())
    }
}

pub fn create(fs: &mut FileSystemManager, args: ContentArgs) -> Result<()> {
    let content = args.content()?;
    fs.create_file(&args.path, &content)?;
    info!("Created {} ({} bytes)", args.path, content.len());
    Ok(())
}

pub fn write(fs: &mut FileSystemManager, args: ContentArgs) -> Result<()> {
    let content = args.content()?;
    fs.write_file(&args.path, &content)?;
    info!("Wrote {} ({} bytes)", args.path, content.len());
    Ok(())
}

pub fn read(fs: &mut FileSystemManager, args: PathArgs) -> Result<()> {
    let content = fs.read_file(&args.path)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;
    Ok(())
}

pub fn rm(fs: &mut FileSystemManager, args: PathArgs) -> Result<()> {
    fs.delete_file(&args.path)?;
    info!("Deleted {}", args.path);
    Ok(())
}

pub fn stat(fs: &FileSystemManager, args: PathArgs) -> Result<()> {
    print_json(fs.stat(&args.path)?)
}

pub fn verify(fs: &FileSystemManager, args: PathArgs) -> Result<()> {
    fs.verify_file(&args.path)
        .with_context(|| format!("{} failed verification", args.path))?;
    println!("{}: OK", args.path);
    Ok(())
}
