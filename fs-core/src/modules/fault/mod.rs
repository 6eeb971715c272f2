//! Fault injection for exercising recovery
//!
//! Deliberately damages the durable state: either the metadata snapshot, so
//! the next load takes the metadata recovery path, or the physical content of
//! a few random files, so their next read fails verification.

use std::fmt;
use std::fs;
use std::str::FromStr;

use log::warn;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, IoContext, Result};
use crate::vfs::FileSystemManager;

/// Content written over corrupted files
pub const CORRUPTION_MARKER: &[u8] = b"CORRUPTED DATA!!!";

/// Content written over a corrupted metadata snapshot
const INVALID_METADATA: &[u8] = b"{{{Invalid JSON!!";

/// Maximum number of files one injection damages
const MAX_CORRUPTED_FILES: usize = 3;

/// What to corrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionKind {
    /// The durable metadata snapshot
    Metadata,
    /// Physical content of up to three random files
    Files,
}

impl FromStr for CorruptionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "metadata" => Ok(CorruptionKind::Metadata),
            "files" => Ok(CorruptionKind::Files),
            other => Err(Error::InvalidArgument(format!(
                "unknown corruption kind {other:?}, expected \"metadata\" or \"files\""
            ))),
        }
    }
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionKind::Metadata => f.write_str("metadata"),
            CorruptionKind::Files => f.write_str("files"),
        }
    }
}

impl FileSystemManager {
    /// Corrupt durable state, picking files with the thread-local RNG
    pub fn corrupt(&mut self, kind: CorruptionKind) -> Result<Vec<String>> {
        self.corrupt_with_rng(kind, &mut rand::thread_rng())
    }

    /// Corrupt durable state, picking files with `rng`.
    ///
    /// Returns the virtual paths of corrupted files, or the metadata file
    /// path for [`CorruptionKind::Metadata`].
    pub fn corrupt_with_rng<R: Rng + ?Sized>(&mut self, kind: CorruptionKind, rng: &mut R) -> Result<Vec<String>> {
        match kind {
            CorruptionKind::Metadata => {
                let path = self.store.path().to_path_buf();
                fs::write(&path, INVALID_METADATA).persist_ctx("corrupting metadata", &path)?;
                warn!("Corrupted metadata snapshot {}", path.display());
                Ok(vec![path.display().to_string()])
            }
            CorruptionKind::Files => {
                let paths: Vec<String> = self.table.files().values().map(|r| r.path.clone()).collect();
                let chosen: Vec<String> = paths
                    .choose_multiple(rng, MAX_CORRUPTED_FILES)
                    .cloned()
                    .collect();

                for path in &chosen {
                    let physical = self.layout.physical_path(path);
                    fs::write(&physical, CORRUPTION_MARKER).persist_ctx("corrupting file", &physical)?;
                    self.cache.invalidate(Some(path));
                    warn!("Corrupted {}", path);
                }
                Ok(chosen)
            }
        }
    }
}
