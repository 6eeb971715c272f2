//! Subcommand implementations

pub mod dirs;
pub mod files;
pub mod maintenance;
pub mod scrub;

use anyhow::Result;
use serde::Serialize;

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
