//! In-memory directory tree and file table
//!
//! Directories are keyed by normalized path and files by file identifier.
//! A directory's `contents` is the only link between the two maps, so every
//! insert and remove here keeps both sides in step.

use std::collections::{BTreeMap, HashSet};

use crate::allocator::BlockAllocator;
use crate::error::{Error, Operation, Result};
use crate::format::{self, ChildRef, DirectoryEntry, EntryKind, FileRecord, ROOT};

/// The directory tree plus the file table
#[derive(Debug, Clone, PartialEq)]
pub struct FileTable {
    directories: BTreeMap<String, DirectoryEntry>,
    files: BTreeMap<String, FileRecord>,
}

impl FileTable {
    /// A tree holding only the root directory
    pub fn new() -> Self {
        let mut directories = BTreeMap::new();
        directories.insert(ROOT.to_string(), DirectoryEntry::new());
        Self {
            directories,
            files: BTreeMap::new(),
        }
    }

    /// Adopt maps read from a snapshot
    pub fn from_parts(
        mut directories: BTreeMap<String, DirectoryEntry>,
        files: BTreeMap<String, FileRecord>,
    ) -> Self {
        directories
            .entry(ROOT.to_string())
            .or_insert_with(DirectoryEntry::new);
        Self { directories, files }
    }

    pub fn directories(&self) -> &BTreeMap<String, DirectoryEntry> {
        &self.directories
    }

    pub fn files(&self) -> &BTreeMap<String, FileRecord> {
        &self.files
    }

    pub(crate) fn files_mut(&mut self) -> &mut BTreeMap<String, FileRecord> {
        &mut self.files
    }

    pub fn directory(&self, path: &str) -> Option<&DirectoryEntry> {
        self.directories.get(path)
    }

    pub fn file(&self, file_id: &str) -> Option<&FileRecord> {
        self.files.get(file_id)
    }

    /// The entry `path` names inside its parent directory
    pub fn child(&self, path: &str) -> Option<&ChildRef> {
        let (parent, name) = format::split_path(path)?;
        self.directories.get(parent)?.contents.get(name)
    }

    /// Resolve `path` to a file record
    pub fn resolve_file(&self, op: Operation, path: &str) -> Result<&FileRecord> {
        let (parent, _) =
            format::split_path(path).ok_or_else(|| Error::type_mismatch(op, path, EntryKind::File))?;
        if !self.directories.contains_key(parent) {
            return Err(Error::not_found(op, parent));
        }
        match self.child(path) {
            Some(ChildRef::File { file_id }) => self
                .files
                .get(file_id)
                .ok_or_else(|| Error::not_found(op, path)),
            Some(ChildRef::Directory { .. }) => Err(Error::type_mismatch(op, path, EntryKind::File)),
            None => Err(Error::not_found(op, path)),
        }
    }

    /// Resolve `path` to a directory entry
    pub fn resolve_directory(&self, op: Operation, path: &str) -> Result<&DirectoryEntry> {
        if let Some(entry) = self.directories.get(path) {
            return Ok(entry);
        }
        match self.child(path) {
            Some(ChildRef::File { .. }) => Err(Error::type_mismatch(op, path, EntryKind::Directory)),
            _ => Err(Error::not_found(op, path)),
        }
    }

    /// Add a file record and link it into its parent directory.
    ///
    /// The parent must exist; callers check before allocating anything.
    pub fn insert_file(&mut self, record: FileRecord) {
        if let Some((parent, name)) = format::split_path(&record.path) {
            if let Some(dir) = self.directories.get_mut(parent) {
                dir.contents.insert(
                    name.to_string(),
                    ChildRef::File {
                        file_id: record.file_id.clone(),
                    },
                );
                dir.modified = record.modified;
            }
        }
        self.files.insert(record.file_id.clone(), record);
    }

    /// Remove a file record and its directory link
    pub fn remove_file(&mut self, file_id: &str) -> Option<FileRecord> {
        let record = self.files.remove(file_id)?;
        self.unlink(&record.path);
        Some(record)
    }

    /// Add a directory and link it into its parent
    pub fn insert_directory(&mut self, path: &str, entry: DirectoryEntry) {
        if let Some((parent, name)) = format::split_path(path) {
            if let Some(dir) = self.directories.get_mut(parent) {
                dir.contents.insert(
                    name.to_string(),
                    ChildRef::Directory {
                        path: path.to_string(),
                    },
                );
                dir.modified = entry.created;
            }
        }
        self.directories.insert(path.to_string(), entry);
    }

    /// Remove a directory entry and its link in the parent.
    ///
    /// Children are not touched; callers empty the directory first.
    pub fn remove_directory(&mut self, path: &str) -> Option<DirectoryEntry> {
        if path == ROOT {
            return None;
        }
        let entry = self.directories.remove(path)?;
        self.unlink(path);
        Some(entry)
    }

    fn unlink(&mut self, path: &str) {
        if let Some((parent, name)) = format::split_path(path) {
            if let Some(dir) = self.directories.get_mut(parent) {
                dir.contents.remove(name);
                dir.modified = format::now();
            }
        }
    }

    /// Every block currently assigned to a file
    pub fn used_blocks(&self) -> impl Iterator<Item = u64> + '_ {
        self.files.values().flat_map(|record| record.blocks.iter().copied())
    }

    pub fn used_block_count(&self) -> u64 {
        self.files.values().map(|r| r.blocks.len() as u64).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    /// Check the structural invariants against an allocator.
    ///
    /// Returns one line per violation; an empty list means the state is
    /// consistent.
    pub fn audit(&self, allocator: &BlockAllocator, block_size: u64) -> Vec<String> {
        let mut problems = Vec::new();

        for path in self.directories.keys() {
            if let Some((parent, name)) = format::split_path(path) {
                match self.directories.get(parent).and_then(|d| d.contents.get(name)) {
                    Some(ChildRef::Directory { path: linked }) if linked == path => {}
                    _ => problems.push(format!("directory {path} is not linked from {parent}")),
                }
            }
        }

        for (dir_path, dir) in &self.directories {
            for (name, child) in &dir.contents {
                let ok = match child {
                    ChildRef::File { file_id } => self.files.contains_key(file_id),
                    ChildRef::Directory { path } => self.directories.contains_key(path),
                };
                if !ok {
                    problems.push(format!("{dir_path} links missing child {name}"));
                }
            }
        }

        let mut seen = HashSet::new();
        for record in self.files.values() {
            let expected = FileRecord::blocks_needed(record.size, block_size);
            if record.blocks.len() as u64 != expected {
                problems.push(format!(
                    "{} holds {} blocks, size needs {}",
                    record.path,
                    record.blocks.len(),
                    expected
                ));
            }
            for &block in &record.blocks {
                if !seen.insert(block) {
                    problems.push(format!("block {block} assigned twice (seen again in {})", record.path));
                }
            }
        }
        for &block in allocator.free_blocks() {
            if !seen.insert(block) {
                problems.push(format!("block {block} is both free and assigned"));
            }
        }

        let high_water = allocator.high_water();
        if seen.len() as u64 != high_water || seen.iter().any(|&b| b == 0 || b > high_water) {
            problems.push(format!(
                "blocks do not cover 1..={high_water} exactly ({} distinct identifiers)",
                seen.len()
            ));
        }

        problems
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64, blocks: Vec<u64>) -> FileRecord {
        let ts = format::now();
        FileRecord {
            file_id: format::file_id_for(path),
            path: path.to_string(),
            size,
            blocks,
            created: ts,
            modified: ts,
            checksum: String::new(),
        }
    }

    #[test]
    fn test_insert_and_resolve() {
        let mut table = FileTable::new();
        table.insert_directory("/docs", DirectoryEntry::new());
        table.insert_file(record("/docs/a.txt", 10, vec![1]));

        let file = table.resolve_file(Operation::ReadFile, "/docs/a.txt").unwrap();
        assert_eq!(file.size, 10);
        assert!(table.resolve_directory(Operation::ListDirectory, "/docs").is_ok());
        assert_eq!(table.directory("/").unwrap().contents.len(), 1);
    }

    #[test]
    fn test_resolve_errors() {
        let mut table = FileTable::new();
        table.insert_directory("/docs", DirectoryEntry::new());
        table.insert_file(record("/docs/a.txt", 0, vec![]));

        let op = Operation::ReadFile;
        let err = table.resolve_file(op, "/nope/a.txt").unwrap_err();
        assert!(matches!(err, Error::NotFound { ref path, .. } if path == "/nope"));
        assert!(matches!(table.resolve_file(op, "/docs/b.txt"), Err(Error::NotFound { .. })));
        assert!(matches!(table.resolve_file(op, "/docs"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(table.resolve_file(op, "/"), Err(Error::TypeMismatch { .. })));

        let op = Operation::ListDirectory;
        assert!(matches!(
            table.resolve_directory(op, "/docs/a.txt"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(table.resolve_directory(op, "/x"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_remove_unlinks() {
        let mut table = FileTable::new();
        table.insert_directory("/docs", DirectoryEntry::new());
        let rec = record("/docs/a.txt", 5, vec![1]);
        let id = rec.file_id.clone();
        table.insert_file(rec);

        assert!(table.remove_file(&id).is_some());
        assert!(table.directory("/docs").unwrap().is_empty());

        assert!(table.remove_directory("/docs").is_some());
        assert!(table.directory("/").unwrap().is_empty());
        assert!(table.remove_directory("/").is_none());
    }

    #[test]
    fn test_audit_detects_problems() {
        let mut alloc = BlockAllocator::new(4);
        let mut table = FileTable::new();
        let blocks = alloc.allocate(1);
        table.insert_file(record("/a.txt", 100, blocks));
        assert!(table.audit(&alloc, 4096).is_empty());

        // Same block handed out twice
        table.insert_file(record("/b.txt", 100, vec![1]));
        assert!(!table.audit(&alloc, 4096).is_empty());
    }

    #[test]
    fn test_audit_detects_wrong_block_count() {
        let alloc = BlockAllocator::from_parts(vec![2], vec![1]);
        let mut table = FileTable::new();
        table.insert_file(record("/a.txt", 5000, vec![1]));
        let problems = table.audit(&alloc, 4096);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("size needs 2"));
    }
}
