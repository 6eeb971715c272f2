//! MetaFS feature modules
//!
//! Integrity, persistence and maintenance passes built on top of the engine.
//! Most of them extend [`FileSystemManager`](crate::FileSystemManager) with
//! extra operations.

pub mod analyzer;
pub mod checksums;
pub mod defrag;
pub mod fault;
pub mod recovery;
pub mod snapshot;

// Re-export checksum types
pub use checksums::ChecksumAlgorithm;

// Re-export snapshot types
pub use snapshot::{LoadOutcome, MetadataStore};

// Re-export maintenance reports
pub use analyzer::{fragmentation_score, PerformanceReport};
pub use defrag::DefragReport;
pub use fault::{CorruptionKind, CORRUPTION_MARKER};
pub use recovery::{MetadataRecovery, ScrubStats};
