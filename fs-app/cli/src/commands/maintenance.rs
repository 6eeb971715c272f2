//! Maintenance commands: defragmentation, analysis, fault injection, recovery

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use metafs::{CorruptionKind, FileSystemManager, MetadataRecovery};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::print_json;

#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Seed for choosing benchmark files, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Parser)]
pub struct CorruptArgs {
    /// What to corrupt: "metadata" or "files"
    pub kind: CorruptionKind,

    /// Seed for choosing which files to corrupt
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Parser)]
pub struct RecoverArgs {
    /// File to restore from its backups; without it, metadata is recovered
    pub path: Option<String>,
}

pub fn defrag(fs: &mut FileSystemManager) -> Result<()> {
    let report = fs.defragment()?;
    print_json(&report)
}

pub fn analyze(fs: &mut FileSystemManager, args: AnalyzeArgs) -> Result<()> {
    let report = match args.seed {
        Some(seed) => fs.analyze_performance_with_rng(&mut StdRng::seed_from_u64(seed))?,
        None => fs.analyze_performance()?,
    };
    print_json(&report)
}

pub fn corrupt(fs: &mut FileSystemManager, args: CorruptArgs) -> Result<()> {
    let hit = match args.seed {
        Some(seed) => fs.corrupt_with_rng(args.kind, &mut StdRng::seed_from_u64(seed))?,
        None => fs.corrupt(args.kind)?,
    };
    if hit.is_empty() {
        warn!("Nothing to corrupt");
    }
    for path in &hit {
        println!("corrupted {}", path);
    }
    Ok(())
}

pub fn recover(fs: &mut FileSystemManager, args: RecoverArgs) -> Result<()> {
    match args.path {
        Some(path) => {
            let backup = fs.recover_file(&path)?;
            println!("restored {} from {}", path, backup.display());
        }
        None => {
            let outcome = fs.recover_metadata()?;
            match &outcome {
                MetadataRecovery::FromBackup(backup) => {
                    info!("Metadata restored from {}", backup.display())
                }
                MetadataRecovery::Rescan { files, directories } => {
                    info!("Metadata rebuilt by rescan: {} files, {} directories", files, directories)
                }
            }
            print_json(&outcome)?;
        }
    }
    Ok(())
}
