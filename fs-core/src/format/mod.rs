//! MetaFS metadata format
//!
//! Records for the directory tree and file table, plus the durable snapshot
//! that bundles them with the allocator state. The serde shape of these types
//! is the on-disk metadata format.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Operation, Result};
use crate::modules::checksums;

/// Path of the root directory
pub const ROOT: &str = "/";

/// Default simulated block size (4KB)
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Length of a file identifier in hex characters
const FILE_ID_LEN: usize = 32;

/// Current local time, used for every created/modified stamp
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Kind of a directory tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    #[default]
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Directory => f.write_str("directory"),
        }
    }
}

/// Reference from a directory to one of its children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChildRef {
    /// A file, by identifier into the file table
    File { file_id: String },
    /// A subdirectory, by normalized path into the directory structure
    Directory { path: String },
}

impl ChildRef {
    pub fn kind(&self) -> EntryKind {
        match self {
            ChildRef::File { .. } => EntryKind::File,
            ChildRef::Directory { .. } => EntryKind::Directory,
        }
    }
}

/// A directory node in the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Always `directory`; kept so the durable format stays self-describing
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    /// Child name to reference
    #[serde(default)]
    pub contents: BTreeMap<String, ChildRef>,
}

impl DirectoryEntry {
    /// Create an empty directory stamped with the current time
    pub fn new() -> Self {
        let ts = now();
        Self::with_times(ts, ts)
    }

    pub fn with_times(created: NaiveDateTime, modified: NaiveDateTime) -> Self {
        Self {
            kind: EntryKind::Directory,
            created,
            modified,
            contents: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl Default for DirectoryEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// A file in the file table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Identifier derived from the path; the file table key
    #[serde(default)]
    pub file_id: String,
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Simulated block assignment, `ceil(size / block_size)` entries
    pub blocks: Vec<u64>,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    /// Content checksum as lowercase hex
    pub checksum: String,
}

impl FileRecord {
    /// Number of blocks a file of this size needs
    pub fn blocks_needed(size: u64, block_size: u64) -> u64 {
        if block_size == 0 {
            return 0;
        }
        (size + block_size - 1) / block_size
    }
}

/// Durable form of the whole metadata state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    #[serde(default)]
    pub free_blocks: Vec<u64>,
    #[serde(default)]
    pub file_table: BTreeMap<String, FileRecord>,
    #[serde(default)]
    pub directory_structure: BTreeMap<String, DirectoryEntry>,
    pub last_updated: NaiveDateTime,
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

impl MetadataSnapshot {
    /// Restore the `file_id` field that the file table key already carries
    pub fn fixup_file_ids(&mut self) {
        for (id, record) in self.file_table.iter_mut() {
            if record.file_id != *id {
                record.file_id = id.clone();
            }
        }
    }
}

/// Deterministic file identifier for a normalized path
pub fn file_id_for(path: &str) -> String {
    let mut id = checksums::sha256_hex(path.as_bytes());
    id.truncate(FILE_ID_LEN);
    id
}

/// Normalize a user supplied path.
///
/// Backslashes become forward slashes, a leading slash is forced and a single
/// trailing slash is stripped (except for the root). Empty, `.` and `..`
/// components are rejected so a virtual path can never leave the store root.
pub fn normalize_path(op: Operation, raw: &str) -> Result<String> {
    let mut path = raw.replace('\\', "/");
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    if path != ROOT {
        for component in path[1..].split('/') {
            let reason = match component {
                "" => "empty path component",
                "." | ".." => "relative path component",
                _ => continue,
            };
            return Err(Error::InvalidPath {
                op,
                path: raw.to_string(),
                reason,
            });
        }
    }

    Ok(path)
}

/// Split a normalized path into parent directory and final name.
///
/// Returns `None` for the root.
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    if path == ROOT {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { ROOT } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

/// Join a directory path and a child name
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        let op = Operation::ReadFile;
        assert_eq!(normalize_path(op, "docs/readme.txt").unwrap(), "/docs/readme.txt");
        assert_eq!(normalize_path(op, "\\docs\\readme.txt").unwrap(), "/docs/readme.txt");
        assert_eq!(normalize_path(op, "/docs/").unwrap(), "/docs");
        assert_eq!(normalize_path(op, "/").unwrap(), "/");
        assert_eq!(normalize_path(op, "").unwrap(), "/");

        assert!(normalize_path(op, "/docs/../etc").is_err());
        assert!(normalize_path(op, "/docs//a").is_err());
        assert!(normalize_path(op, "/./a").is_err());
    }

    #[test]
    fn test_split_and_join() {
        assert_eq!(split_path("/"), None);
        assert_eq!(split_path("/docs"), Some(("/", "docs")));
        assert_eq!(split_path("/docs/a/b.txt"), Some(("/docs/a", "b.txt")));
        assert_eq!(join_path("/", "docs"), "/docs");
        assert_eq!(join_path("/docs", "a"), "/docs/a");
    }

    #[test]
    fn test_file_id_is_stable() {
        let a = file_id_for("/docs/readme.txt");
        let b = file_id_for("/docs/readme.txt");
        assert_eq!(a, b);
        assert_eq!(a.len(), FILE_ID_LEN);
        assert_ne!(a, file_id_for("/docs/other.txt"));
    }

    #[test]
    fn test_blocks_needed() {
        assert_eq!(FileRecord::blocks_needed(0, 4096), 0);
        assert_eq!(FileRecord::blocks_needed(1, 4096), 1);
        assert_eq!(FileRecord::blocks_needed(4096, 4096), 1);
        assert_eq!(FileRecord::blocks_needed(4097, 4096), 2);
    }

    #[test]
    fn test_child_ref_wire_shape() {
        let child = ChildRef::File {
            file_id: "abc".to_string(),
        };
        let json = serde_json::to_value(&child).unwrap();
        assert_eq!(json, serde_json::json!({"type": "file", "file_id": "abc"}));

        let dir: ChildRef =
            serde_json::from_value(serde_json::json!({"type": "directory", "path": "/docs"})).unwrap();
        assert_eq!(dir, ChildRef::Directory { path: "/docs".to_string() });
        assert_eq!(dir.kind(), EntryKind::Directory);
    }

    #[test]
    fn test_snapshot_fixes_file_ids() {
        let json = serde_json::json!({
            "block_size": 4096,
            "free_blocks": [3, 4],
            "file_table": {
                "id1": {
                    "path": "/a.txt",
                    "size": 5,
                    "blocks": [1],
                    "created": "2024-05-01T10:00:00",
                    "modified": "2024-05-01T10:00:00",
                    "checksum": "00"
                }
            },
            "directory_structure": {
                "/": {
                    "type": "directory",
                    "created": "2024-05-01T10:00:00",
                    "modified": "2024-05-01T10:00:00",
                    "contents": {"a.txt": {"type": "file", "file_id": "id1"}}
                }
            },
            "last_updated": "2024-05-01T10:00:00.123456"
        });
        let mut snapshot: MetadataSnapshot = serde_json::from_value(json).unwrap();
        snapshot.fixup_file_ids();
        assert_eq!(snapshot.file_table["id1"].file_id, "id1");
        assert_eq!(snapshot.directory_structure["/"].contents.len(), 1);
    }
}
