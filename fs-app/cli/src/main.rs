//! MetaFS Command Line Interface
//!
//! Drives a MetaFS store rooted at a local directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use metafs::{FileSystemManager, FsConfig};

mod commands;

/// MetaFS - metadata-governed virtual file system
#[derive(Parser)]
#[command(
    name = "metafs",
    about = "MetaFS command-line interface",
    version = env!("CARGO_PKG_VERSION"),
    author = "MetaFS Contributors"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Store root directory (overrides the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a directory and any missing parents
    Mkdir(commands::dirs::MkdirArgs),

    /// List a directory
    Ls(commands::dirs::LsArgs),

    /// Delete a directory
    Rmdir(commands::dirs::RmdirArgs),

    /// Create a new file
    Create(commands::files::ContentArgs),

    /// Write a file, creating it if needed
    Write(commands::files::ContentArgs),

    /// Print a file's content
    Read(commands::files::PathArgs),

    /// Delete a file
    Rm(commands::files::PathArgs),

    /// Show a file's metadata record
    Stat(commands::files::PathArgs),

    /// Renumber blocks so every file is contiguous
    Defrag,

    /// Report fragmentation and benchmark a few files
    Analyze(commands::maintenance::AnalyzeArgs),

    /// Deliberately corrupt metadata or file content
    Corrupt(commands::maintenance::CorruptArgs),

    /// Run recovery for metadata or one file
    Recover(commands::maintenance::RecoverArgs),

    /// Check one file against its recorded checksum
    Verify(commands::files::PathArgs),

    /// Verify every file and repair what can be repaired
    Scrub(commands::scrub::ScrubArgs),
}

fn load_config(cli: &Cli) -> Result<FsConfig> {
    let mut config = match &cli.config {
        Some(path) => FsConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FsConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root_dir = root.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .init();

    info!("MetaFS CLI v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let root = config.root_dir.clone();
    let mut fs = FileSystemManager::open(config)
        .with_context(|| format!("Failed to open store at {}", root.display()))?;

    // Execute the appropriate command
    match cli.command {
        Commands::Mkdir(args) => commands::dirs::mkdir(&mut fs, args),
        Commands::Ls(args) => commands::dirs::ls(&fs, args),
        Commands::Rmdir(args) => commands::dirs::rmdir(&mut fs, args),
        Commands::Create(args) => commands::files::create(&mut fs, args),
        Commands::Write(args) => commands::files::write(&mut fs, args),
        Commands::Read(args) => commands::files::read(&mut fs, args),
        Commands::Rm(args) => commands::files::rm(&mut fs, args),
        Commands::Stat(args) => commands::files::stat(&fs, args),
        Commands::Verify(args) => commands::files::verify(&fs, args),
        Commands::Defrag => commands::maintenance::defrag(&mut fs),
        Commands::Analyze(args) => commands::maintenance::analyze(&mut fs, args),
        Commands::Corrupt(args) => commands::maintenance::corrupt(&mut fs, args),
        Commands::Recover(args) => commands::maintenance::recover(&mut fs, args),
        Commands::Scrub(args) => commands::scrub::run(&mut fs, args),
    }
}
