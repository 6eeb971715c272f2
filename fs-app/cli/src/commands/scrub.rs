//! Scrub command for filesystem verification and repair

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use metafs::{FileSystemManager, ScrubStats};

/// Check and repair filesystem integrity
#[derive(Parser)]
#[command(about = "Check and repair MetaFS file integrity")]
pub struct ScrubArgs {
    /// Print statistics as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

pub fn run(fs: &mut FileSystemManager, args: ScrubArgs) -> Result<()> {
    info!("Starting scrub of {}", fs.layout().root.display());
    let start_time = Instant::now();

    let stats = fs.scrub()?;
    info!("Scrub completed in {:.2} seconds", start_time.elapsed().as_secs_f64());

    if args.json {
        super::print_json(&stats)?;
    } else {
        print_stats(&stats);
    }

    // Check results
    if stats.files_corrupted == 0 {
        println!("\n✓ Filesystem is healthy - no errors found");
    } else if stats.files_unrepairable > 0 {
        error!("{} files could not be repaired", stats.files_unrepairable);
        println!("  Data loss may have occurred. No matching backup was found.");
        std::process::exit(1);
    } else if stats.files_corrupted > stats.files_repaired {
        warn!("Filesystem has errors that were not fully repaired");
        std::process::exit(2);
    } else {
        println!("\n✓ All errors were successfully repaired");
    }
    Ok(())
}

fn print_stats(stats: &ScrubStats) {
    println!("\nScrub Statistics:");
    println!("  Files scrubbed:     {}", stats.files_scrubbed);
    println!("  Files corrupted:    {}", stats.files_corrupted);
    println!("  Files repaired:     {}", stats.files_repaired);
    println!("  Files unrepairable: {}", stats.files_unrepairable);

    let duration = stats.end_time - stats.start_time;
    println!(
        "  Duration:           {:.3} seconds",
        duration.num_milliseconds() as f64 / 1000.0
    );

    if stats.files_corrupted > 0 {
        let error_rate = (stats.files_corrupted as f64 / stats.files_scrubbed as f64) * 100.0;
        println!("  Error rate:         {:.2}%", error_rate);
    }
}
