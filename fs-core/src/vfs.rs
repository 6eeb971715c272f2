//! Virtual file system engine
//!
//! [`FileSystemManager`] owns the whole metadata state of one store: the
//! directory tree and file table, the block allocator, the read cache and the
//! snapshot store. Every mutating operation updates memory, writes physical
//! content and persists a snapshot before it returns.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::allocator::BlockAllocator;
use crate::cache::{CacheStats, ReadCache};
use crate::config::{CacheConfig, FsConfig};
use crate::error::{Error, IoContext, Operation, Result};
use crate::format::{
    self, normalize_path, ChildRef, DirectoryEntry, EntryKind, FileRecord, MetadataSnapshot, ROOT,
};
use crate::layout::Layout;
use crate::modules::checksums;
use crate::modules::snapshot::{LoadOutcome, MetadataStore};
use crate::table::FileTable;

/// An engine behind the single mutex concurrent callers must share
pub type SharedFileSystem = Arc<Mutex<FileSystemManager>>;

/// One child in a [`DirectoryListing`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ListingEntry {
    File {
        size: u64,
        created: NaiveDateTime,
        modified: NaiveDateTime,
    },
    Directory {
        created: NaiveDateTime,
        modified: NaiveDateTime,
        item_count: usize,
    },
}

/// Shallow view of a directory and its children
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryListing {
    pub name: String,
    pub path: String,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub contents: BTreeMap<String, ListingEntry>,
}

/// The metadata-governed file system engine
pub struct FileSystemManager {
    pub(crate) config: FsConfig,
    pub(crate) layout: Layout,
    pub(crate) store: MetadataStore,
    pub(crate) allocator: BlockAllocator,
    pub(crate) table: FileTable,
    pub(crate) cache: ReadCache,
    pub(crate) block_size: u64,
}

impl FileSystemManager {
    /// Open the store described by `config`, creating it if it does not exist.
    ///
    /// A corrupt snapshot is recovered from the newest readable backup, or by
    /// rescanning the physical tree when no backup can be read.
    pub fn open(config: FsConfig) -> Result<Self> {
        let layout = Layout::new(&config);
        layout.ensure_dirs()?;

        let mut fs = Self {
            store: MetadataStore::new(layout.clone(), config.max_metadata_backups),
            allocator: BlockAllocator::new(config.initial_blocks),
            table: FileTable::new(),
            cache: ReadCache::new(&config.cache),
            block_size: config.block_size,
            layout,
            config,
        };
        fs.load()?;
        Ok(fs)
    }

    /// Convenience for [`open`](Self::open) with default settings
    pub fn open_at(root_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open(FsConfig::new(root_dir))
    }

    /// Wrap the engine for use behind one shared mutex
    pub fn into_shared(self) -> SharedFileSystem {
        Arc::new(Mutex::new(self))
    }

    /// Replace the in-memory state with the durable snapshot
    pub fn load(&mut self) -> Result<()> {
        match self.store.load() {
            LoadOutcome::Missing => {
                info!("No metadata at {}, initializing fresh file system", self.store.path().display());
                self.reset_state();
                self.save()
            }
            LoadOutcome::Loaded(snapshot) => {
                self.adopt(snapshot);
                debug!(
                    "Loaded metadata: {} files, {} directories",
                    self.table.file_count(),
                    self.table.directory_count()
                );
                Ok(())
            }
            LoadOutcome::Corrupt(e) => {
                warn!("Metadata at {} is unusable: {}", self.store.path().display(), e);
                let outcome = self.recover_metadata()?;
                info!("Metadata recovered: {:?}", outcome);
                Ok(())
            }
        }
    }

    /// Persist the current state, backing up the previous snapshot first
    pub fn checkpoint(&mut self) -> Result<()> {
        self.save()
    }

    pub(crate) fn save(&self) -> Result<()> {
        self.store.save(&self.snapshot())?;
        Ok(())
    }

    /// Durable form of the current state
    pub fn snapshot(&self) -> MetadataSnapshot {
        MetadataSnapshot {
            block_size: self.block_size,
            free_blocks: self.allocator.free_blocks().to_vec(),
            file_table: self.table.files().clone(),
            directory_structure: self.table.directories().clone(),
            last_updated: format::now(),
        }
    }

    pub(crate) fn adopt(&mut self, snapshot: MetadataSnapshot) {
        self.block_size = snapshot.block_size;
        let used: Vec<u64> = snapshot
            .file_table
            .values()
            .flat_map(|record| record.blocks.iter().copied())
            .collect();
        self.allocator = BlockAllocator::from_parts(snapshot.free_blocks, used);
        self.table = FileTable::from_parts(snapshot.directory_structure, snapshot.file_table);
        self.cache.invalidate(None);
    }

    /// Fresh file system: full block range, root directory only
    pub(crate) fn reset_state(&mut self) {
        self.block_size = self.config.block_size;
        self.allocator = BlockAllocator::new(self.config.initial_blocks);
        self.table = FileTable::new();
        self.cache.invalidate(None);
    }

    /// Normalize a caller's path and refuse the ones that address the
    /// store's own metadata or backups
    pub(crate) fn normalize(&self, op: Operation, raw: &str) -> Result<String> {
        let path = normalize_path(op, raw)?;
        if self.layout.is_reserved_path(&path) {
            return Err(Error::InvalidPath {
                op,
                path: raw.to_string(),
                reason: "reserved for store metadata",
            });
        }
        Ok(path)
    }

    // ---- directories ----

    /// Create a directory and any missing ancestors
    pub fn create_directory(&mut self, path: &str) -> Result<()> {
        let op = Operation::CreateDirectory;
        let path = self.normalize(op, path)?;
        if self.table.directory(&path).is_some() || self.table.child(&path).is_some() {
            return Err(Error::already_exists(op, path));
        }
        self.make_directories(op, &path)?;
        self.save()?;
        info!("Created directory {}", path);
        Ok(())
    }

    /// Create `path` and every missing ancestor without persisting.
    ///
    /// The whole chain is validated before anything is created.
    fn make_directories(&mut self, op: Operation, path: &str) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = path;
        while self.table.directory(current).is_none() {
            if let Some(ChildRef::File { .. }) = self.table.child(current) {
                return Err(Error::type_mismatch(op, current, EntryKind::Directory));
            }
            missing.push(current.to_string());
            match format::split_path(current) {
                Some((parent, _)) => current = parent,
                None => break,
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let physical = self.layout.physical_path(path);
        fs::create_dir_all(&physical).persist_ctx("creating directory", &physical)?;

        let ts = format::now();
        for dir in missing.iter().rev() {
            self.table.insert_directory(dir, DirectoryEntry::with_times(ts, ts));
            debug!("make_directories: registered {}", dir);
        }
        Ok(())
    }

    /// Shallow listing of a directory
    pub fn list_directory(&self, path: &str) -> Result<DirectoryListing> {
        let op = Operation::ListDirectory;
        let path = self.normalize(op, path)?;
        let dir = self.table.resolve_directory(op, &path)?;

        let mut contents = BTreeMap::new();
        for (name, child) in &dir.contents {
            let entry = match child {
                ChildRef::File { file_id } => match self.table.file(file_id) {
                    Some(record) => ListingEntry::File {
                        size: record.size,
                        created: record.created,
                        modified: record.modified,
                    },
                    None => continue,
                },
                ChildRef::Directory { path } => match self.table.directory(path) {
                    Some(sub) => ListingEntry::Directory {
                        created: sub.created,
                        modified: sub.modified,
                        item_count: sub.contents.len(),
                    },
                    None => continue,
                },
            };
            contents.insert(name.clone(), entry);
        }

        let name = format::split_path(&path)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| ROOT.to_string());
        Ok(DirectoryListing {
            name,
            created: dir.created,
            modified: dir.modified,
            path,
            contents,
        })
    }

    /// Delete a directory; `recursive` also deletes everything below it
    pub fn delete_directory(&mut self, path: &str, recursive: bool) -> Result<()> {
        let op = Operation::DeleteDirectory;
        let path = self.normalize(op, path)?;
        if path == ROOT {
            return Err(Error::InvalidPath {
                op,
                path,
                reason: "cannot delete the root directory",
            });
        }
        let dir = self.table.resolve_directory(op, &path)?;
        if !dir.is_empty() && !recursive {
            return Err(Error::NotEmpty { path });
        }

        // Pre-order walk; deleting in reverse removes children before parents
        let mut order = Vec::new();
        let mut stack = vec![path.clone()];
        while let Some(current) = stack.pop() {
            if let Some(entry) = self.table.directory(&current) {
                for child in entry.contents.values() {
                    if let ChildRef::Directory { path } = child {
                        stack.push(path.clone());
                    }
                }
            }
            order.push(current);
        }

        for dir_path in order.iter().rev() {
            let files: Vec<(String, String)> = match self.table.directory(dir_path) {
                Some(entry) => entry
                    .contents
                    .iter()
                    .filter_map(|(name, child)| match child {
                        ChildRef::File { file_id } => {
                            Some((format::join_path(dir_path, name), file_id.clone()))
                        }
                        ChildRef::Directory { .. } => None,
                    })
                    .collect(),
                None => continue,
            };
            for (file_path, file_id) in files {
                self.remove_file_entry(&file_path, &file_id)?;
            }
            self.table.remove_directory(dir_path);
            debug!("delete_directory: removed {}", dir_path);
        }

        let physical = self.layout.physical_path(&path);
        if let Err(e) = fs::remove_dir(&physical) {
            match e.kind() {
                io::ErrorKind::NotFound => {}
                _ if recursive => {
                    fs::remove_dir_all(&physical).persist_ctx("removing directory tree", &physical)?
                }
                _ => return Err(e).persist_ctx("removing directory", &physical),
            }
        }

        self.save()?;
        info!("Deleted directory {}{}", path, if recursive { " (recursive)" } else { "" });
        Ok(())
    }

    // ---- files ----

    /// Create a new file with the given content
    pub fn create_file(&mut self, path: &str, content: &[u8]) -> Result<()> {
        let op = Operation::CreateFile;
        let path = self.normalize(op, path)?;
        self.create_file_at(op, &path, content)
    }

    fn create_file_at(&mut self, op: Operation, path: &str, content: &[u8]) -> Result<()> {
        let (parent, name) = format::split_path(path).ok_or_else(|| Error::already_exists(op, path))?;
        let dir = self.table.resolve_directory(op, parent)?;
        if dir.contents.contains_key(name) {
            return Err(Error::already_exists(op, path));
        }

        let physical = self.write_physical(path, content)?;
        let checksum = self.checksum_physical(&physical)?;
        let blocks = self
            .allocator
            .allocate(FileRecord::blocks_needed(content.len() as u64, self.block_size));

        let ts = format::now();
        self.table.insert_file(FileRecord {
            file_id: format::file_id_for(path),
            path: path.to_string(),
            size: content.len() as u64,
            blocks,
            created: ts,
            modified: ts,
            checksum,
        });

        if self.config.backup_on_write {
            self.backup_file(path)?;
        }
        self.cache.insert(path, content.to_vec());
        self.save()?;
        info!("Created file {} ({} bytes)", path, content.len());
        Ok(())
    }

    /// Replace a file's content, creating the file (and its parents) if needed
    pub fn write_file(&mut self, path: &str, content: &[u8]) -> Result<()> {
        let op = Operation::WriteFile;
        let path = self.normalize(op, path)?;
        let (parent, name) = format::split_path(&path)
            .ok_or_else(|| Error::type_mismatch(op, path.as_str(), EntryKind::File))?;

        self.cache.invalidate(Some(&path));
        if self.table.directory(parent).is_none() {
            self.make_directories(op, parent)?;
        }

        let file_id = match self.table.child(&path) {
            Some(ChildRef::File { file_id }) => file_id.clone(),
            Some(ChildRef::Directory { .. }) => {
                return Err(Error::type_mismatch(op, path, EntryKind::File))
            }
            None => {
                debug!("write_file: {} has no entry under {}, creating", name, parent);
                return self.create_file_at(op, &path, content);
            }
        };

        self.backup_file(&path)?;
        let physical = self.write_physical(&path, content)?;
        let checksum = self.checksum_physical(&physical)?;

        let needed = FileRecord::blocks_needed(content.len() as u64, self.block_size);
        let record = self
            .table
            .files_mut()
            .get_mut(&file_id)
            .ok_or_else(|| Error::not_found(op, path.as_str()))?;
        self.allocator.release(&record.blocks);
        record.blocks = self.allocator.allocate(needed);
        record.size = content.len() as u64;
        record.modified = format::now();
        record.checksum = checksum;

        if self.config.backup_on_write {
            self.backup_file(&path)?;
        }
        self.cache.insert(&path, content.to_vec());
        self.save()?;
        info!("Wrote {} bytes to {}", content.len(), path);
        Ok(())
    }

    /// Read a file, verifying its checksum unless the content is cached.
    ///
    /// A checksum mismatch triggers per-file recovery. If no backup matches,
    /// the content on disk is returned as it is.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let op = Operation::ReadFile;
        let path = self.normalize(op, path)?;
        if let Some(content) = self.cache.get(&path) {
            debug!("read_file: cache hit for {}", path);
            return Ok(content);
        }

        let expected = self.table.resolve_file(op, &path)?.checksum.clone();
        match self.verify_at(&path, &expected) {
            Ok(()) => {}
            Err(Error::IntegrityMismatch { actual, .. }) => {
                warn!("{} may be corrupted (checksum {} != {})", path, actual, expected);
                match self.recover_file_at(&path, &expected) {
                    Ok(backup) => info!("Recovered {} from {}", path, backup.display()),
                    Err(e) => warn!("Could not recover {}: {}", path, e),
                }
            }
            Err(e) => return Err(e),
        }

        let physical = self.layout.physical_path(&path);
        let content = match fs::read(&physical) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::not_found(op, path)),
            Err(e) => return Err(e).persist_ctx("reading file", &physical),
        };
        self.cache.insert(&path, content.clone());
        Ok(content)
    }

    /// Delete a file
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let op = Operation::DeleteFile;
        let path = self.normalize(op, path)?;
        let file_id = self.table.resolve_file(op, &path)?.file_id.clone();
        self.remove_file_entry(&path, &file_id)?;
        self.save()?;
        info!("Deleted file {}", path);
        Ok(())
    }

    /// Back up, unlink and release one file without persisting
    fn remove_file_entry(&mut self, path: &str, file_id: &str) -> Result<()> {
        self.backup_file(path)?;

        let physical = self.layout.physical_path(path);
        match fs::remove_file(&physical) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).persist_ctx("removing file", &physical),
        }

        if let Some(record) = self.table.remove_file(file_id) {
            self.allocator.release(&record.blocks);
        }
        self.cache.invalidate(Some(path));
        Ok(())
    }

    /// Metadata of one file
    pub fn stat(&self, path: &str) -> Result<&FileRecord> {
        let op = Operation::ReadFile;
        let path = self.normalize(op, path)?;
        self.table.resolve_file(op, &path)
    }

    fn write_physical(&self, path: &str, content: &[u8]) -> Result<PathBuf> {
        let physical = self.layout.physical_path(path);
        if let Some(parent) = physical.parent() {
            fs::create_dir_all(parent).persist_ctx("creating parent directory", parent)?;
        }
        fs::write(&physical, content).persist_ctx("writing file", &physical)?;
        Ok(physical)
    }

    pub(crate) fn checksum_physical(&self, physical: &Path) -> Result<String> {
        checksums::checksum_file(self.config.checksum, physical).persist_ctx("checksumming file", physical)
    }

    // ---- cache ----

    /// Resize the read cache and change its TTL
    pub fn configure_cache(&mut self, max_size: usize, ttl: Duration) {
        let config = CacheConfig {
            max_size,
            ttl_ms: ttl.as_millis() as u64,
        };
        self.cache.configure(&config);
        self.config.cache = config;
        debug!("Cache configured: max_size={}, ttl={:?}", max_size, ttl);
    }

    /// Drop one cached path, or the whole cache when `path` is `None`
    pub fn invalidate_cache(&mut self, path: Option<&str>) {
        match path {
            Some(raw) => {
                if let Ok(path) = self.normalize(Operation::ReadFile, raw) {
                    self.cache.invalidate(Some(&path));
                }
            }
            None => self.cache.invalidate(None),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn is_cached(&self, path: &str) -> bool {
        self.normalize(Operation::ReadFile, path).is_ok_and(|path| self.cache.contains(&path))
    }

    // ---- inspection ----

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn table(&self) -> &FileTable {
        &self.table
    }

    pub fn allocator(&self) -> &BlockAllocator {
        &self.allocator
    }

    /// Consistency problems in the current state, empty when sound
    pub fn audit(&self) -> Vec<String> {
        self.table.audit(&self.allocator, self.block_size)
    }
}
