//! MetaFS Core - A metadata-governed virtual file system engine
//!
//! Files and directories live in a real directory tree, while a JSON metadata
//! snapshot records the directory structure, a file table with content
//! checksums, and a simulated block allocation for every file. On top of that
//! the engine caches reads, keeps dated backups of metadata and file content,
//! and recovers from corruption of either.
//!
//! ```no_run
//! use metafs::FileSystemManager;
//!
//! # fn main() -> metafs::Result<()> {
//! let mut fs = FileSystemManager::open_at("virtual_fs")?;
//! fs.create_directory("/docs")?;
//! fs.create_file("/docs/readme.txt", b"Welcome to the FS tool.")?;
//! assert_eq!(fs.read_file("/docs/readme.txt")?, b"Welcome to the FS tool.");
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rust_2018_idioms)]

pub mod allocator;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod layout;
pub mod modules;
pub mod table;
pub mod vfs;

// Re-export the error types
pub use error::{Error, ErrorKind, Operation, Result};

pub use config::{CacheConfig, FsConfig};
pub use format::{ChildRef, DirectoryEntry, EntryKind, FileRecord, MetadataSnapshot};
pub use modules::{
    ChecksumAlgorithm, CorruptionKind, DefragReport, MetadataRecovery, PerformanceReport, ScrubStats,
};
pub use vfs::{DirectoryListing, FileSystemManager, ListingEntry, SharedFileSystem};

/// Re-export common types and traits
pub mod prelude {
    pub use crate::error::Result;
    pub use crate::vfs::FileSystemManager;
}
