//! Directory commands

use anyhow::Result;
use clap::Parser;
use log::info;
use metafs::FileSystemManager;

use super::print_json;

#[derive(Parser)]
pub struct MkdirArgs {
    /// Directory to create
    pub path: String,
}

#[derive(Parser)]
pub struct LsArgs {
    /// Directory to list
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Parser)]
pub struct RmdirArgs {
    /// Directory to delete
    pub path: String,

    /// Delete everything below the directory too
    #[arg(short, long)]
    pub recursive: bool,
}

pub fn mkdir(fs: &mut FileSystemManager, args: MkdirArgs) -> Result<()> {
    fs.create_directory(&args.path)?;
    info!("Created directory {}", args.path);
    Ok(())
}

pub fn ls(fs: &FileSystemManager, args: LsArgs) -> Result<()> {
    print_json(&fs.list_directory(&args.path)?)
}

pub fn rmdir(fs: &mut FileSystemManager, args: RmdirArgs) -> Result<()> {
    fs.delete_directory(&args.path, args.recursive)?;
    info!("Deleted directory {}", args.path);
    Ok(())
}
