//! Engine configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IoContext, Result};
use crate::format::DEFAULT_BLOCK_SIZE;
use crate::modules::checksums::ChecksumAlgorithm;

/// Default number of blocks in a fresh pool
const DEFAULT_INITIAL_BLOCKS: u64 = 1000;

/// Read cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached files
    pub max_size: usize,
    /// Entry lifetime in milliseconds
    pub ttl_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl_ms: 300_000, // 5 minutes
        }
    }
}

/// Configuration for a filesystem instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Physical directory backing the virtual tree
    pub root_dir: PathBuf,
    /// Metadata snapshot file name, inside `root_dir`
    pub metadata_file: String,
    /// Backup directory name, inside `root_dir`
    pub backup_dir: String,
    /// Simulated block size in bytes
    pub block_size: u64,
    /// Size of the block pool for a fresh filesystem
    pub initial_blocks: u64,
    /// Checksum algorithm for file content
    pub checksum: ChecksumAlgorithm,
    /// Also back up freshly written content, not only the content it replaces
    pub backup_on_write: bool,
    /// Generations kept per file; `None` keeps everything
    pub max_file_backups: Option<usize>,
    /// Metadata snapshot generations kept; `None` keeps everything
    pub max_metadata_backups: Option<usize>,
    /// Read cache settings
    pub cache: CacheConfig,
}

impl FsConfig {
    /// Default configuration rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Load a (possibly partial) configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).persist_ctx("reading config", path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("virtual_fs"),
            metadata_file: "fs_metadata.json".to_string(),
            backup_dir: ".backups".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            initial_blocks: DEFAULT_INITIAL_BLOCKS,
            checksum: ChecksumAlgorithm::default(),
            backup_on_write: true,
            max_file_backups: Some(32),
            max_metadata_backups: Some(64),
            cache: CacheConfig::default(),
        }
    }
}
