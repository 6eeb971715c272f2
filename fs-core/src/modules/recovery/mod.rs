//! Backup and recovery for MetaFS
//!
//! Two independent paths lead back to a consistent state:
//!
//! - metadata recovery, taken when the snapshot cannot be read: the newest
//!   parsable metadata backup is adopted, and failing that the physical tree
//!   is rescanned into a fresh file system;
//! - per-file recovery, taken when content no longer matches its recorded
//!   checksum: the newest per-file backup whose checksum equals the recorded
//!   one is copied back over the physical file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, IoContext, Operation, Result};
use crate::format::{self, DirectoryEntry, FileRecord, ROOT};
use crate::modules::checksums;
use crate::vfs::FileSystemManager;

/// Checksum reported for a physical file that does not exist
const MISSING_CONTENT: &str = "<missing>";

/// How metadata recovery rebuilt the state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRecovery {
    /// Adopted the named metadata backup
    FromBackup(PathBuf),
    /// No backup was usable; rebuilt from the physical tree
    Rescan { files: usize, directories: usize },
}

/// Scrub statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrubStats {
    /// Files verified
    pub files_scrubbed: u64,
    /// Files with checksum mismatches
    pub files_corrupted: u64,
    /// Files restored from a backup
    pub files_repaired: u64,
    /// Files with no matching backup
    pub files_unrepairable: u64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

impl FileSystemManager {
    /// Rebuild the metadata state after the snapshot became unusable.
    ///
    /// The recovered state replaces the corrupt snapshot without being
    /// backed up itself.
    pub fn recover_metadata(&mut self) -> Result<MetadataRecovery> {
        let backups = self.store.backups().unwrap_or_else(|e| {
            warn!("Could not list metadata backups: {}", e);
            Vec::new()
        });

        for backup in backups {
            match self.store.load_backup(&backup) {
                Ok(snapshot) => {
                    self.adopt(snapshot);
                    self.store.overwrite(&self.snapshot())?;
                    info!("Metadata restored from backup {}", backup.display());
                    return Ok(MetadataRecovery::FromBackup(backup));
                }
                Err(e) => warn!("Skipping unusable metadata backup {}: {}", backup.display(), e),
            }
        }

        warn!("No usable metadata backup, rescanning {}", self.layout.root.display());
        let (files, directories) = self.rescan()?;
        self.store.overwrite(&self.snapshot())?;
        info!("Rescan rebuilt {} files in {} directories", files, directories);
        Ok(MetadataRecovery::Rescan { files, directories })
    }

    /// Reinitialize, then register every object under the physical root.
    ///
    /// Returns the number of files and directories (root included) found.
    fn rescan(&mut self) -> Result<(usize, usize)> {
        self.reset_state();
        let layout = self.layout.clone();
        let root = layout.root.clone();

        let walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || !layout.is_reserved(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("rescan: skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let Some(vpath) = virtual_path(&root, entry.path()) else {
                warn!("rescan: skipping non UTF-8 path {}", entry.path().display());
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                let ts = modified_time(entry.path());
                self.table.insert_directory(&vpath, DirectoryEntry::with_times(ts, ts));
            } else if file_type.is_file() {
                let physical = entry.path();
                let size = entry
                    .metadata()
                    .map_err(io::Error::from)
                    .persist_ctx("scanning file", physical)?
                    .len();
                let checksum = self.checksum_physical(physical)?;
                let blocks = self.allocator.allocate(FileRecord::blocks_needed(size, self.block_size));
                let ts = modified_time(physical);
                self.table.insert_file(FileRecord {
                    file_id: format::file_id_for(&vpath),
                    path: vpath,
                    size,
                    blocks,
                    created: ts,
                    modified: ts,
                    checksum,
                });
            } else {
                debug!("rescan: ignoring special file {}", entry.path().display());
            }
        }

        Ok((self.table.file_count(), self.table.directory_count()))
    }

    /// Copy a file's current physical content into the backup directory.
    ///
    /// Returns `None` when there is no physical content to back up.
    pub(crate) fn backup_file(&self, path: &str) -> Result<Option<PathBuf>> {
        let physical = self.layout.physical_path(path);
        if !physical.is_file() {
            return Ok(None);
        }

        let backup = self.layout.new_file_backup_path(path);
        fs::copy(&physical, &backup).persist_ctx("backing up file", &backup)?;
        debug!("backup_file: {} -> {}", path, backup.display());

        if let Some(max) = self.config.max_file_backups {
            let backups = self.layout.file_backups(path)?;
            if backups.len() > max {
                for old in &backups[..backups.len() - max] {
                    fs::remove_file(old).persist_ctx("pruning file backup", old)?;
                }
            }
        }
        Ok(Some(backup))
    }

    /// Restore a file from its newest backup matching the recorded checksum
    pub fn recover_file(&mut self, path: &str) -> Result<PathBuf> {
        let op = Operation::RecoverFile;
        let path = self.normalize(op, path)?;
        let expected = self.table.resolve_file(op, &path)?.checksum.clone();
        let backup = self.recover_file_at(&path, &expected)?;
        self.cache.invalidate(Some(&path));
        Ok(backup)
    }

    pub(crate) fn recover_file_at(&self, path: &str, expected: &str) -> Result<PathBuf> {
        let physical = self.layout.physical_path(path);

        for backup in self.layout.file_backups(path)?.iter().rev() {
            let checksum = match checksums::checksum_file(self.config.checksum, backup) {
                Ok(checksum) => checksum,
                Err(e) => {
                    warn!("recover_file: cannot read backup {}: {}", backup.display(), e);
                    continue;
                }
            };
            if checksum != expected {
                debug!("recover_file: {} does not match", backup.display());
                continue;
            }

            if let Some(parent) = physical.parent() {
                fs::create_dir_all(parent).persist_ctx("creating parent directory", parent)?;
            }
            fs::copy(backup, &physical).persist_ctx("restoring file", &physical)?;
            info!("Restored {} from {}", path, backup.display());
            return Ok(backup.clone());
        }

        Err(Error::UnrecoverableCorruption {
            path: path.to_string(),
        })
    }

    /// Check a file's content against its recorded checksum without repairing
    pub fn verify_file(&self, path: &str) -> Result<()> {
        let op = Operation::VerifyFile;
        let path = self.normalize(op, path)?;
        let expected = &self.table.resolve_file(op, &path)?.checksum;
        self.verify_at(&path, expected)
    }

    pub(crate) fn verify_at(&self, path: &str, expected: &str) -> Result<()> {
        let physical = self.layout.physical_path(path);
        let actual = match checksums::checksum_file(self.config.checksum, &physical) {
            Ok(actual) => actual,
            Err(e) if e.kind() == io::ErrorKind::NotFound => MISSING_CONTENT.to_string(),
            Err(e) => return Err(e).persist_ctx("checksumming file", &physical),
        };
        if actual == expected {
            Ok(())
        } else {
            Err(Error::IntegrityMismatch {
                path: path.to_string(),
                expected: expected.to_string(),
                actual,
            })
        }
    }

    /// Verify every file, restoring those that no longer match
    pub fn scrub(&mut self) -> Result<ScrubStats> {
        let start_time = format::now();
        let mut stats = ScrubStats {
            files_scrubbed: 0,
            files_corrupted: 0,
            files_repaired: 0,
            files_unrepairable: 0,
            start_time,
            end_time: start_time,
        };

        let files: Vec<(String, String)> = self
            .table
            .files()
            .values()
            .map(|record| (record.path.clone(), record.checksum.clone()))
            .collect();

        for (path, expected) in files {
            stats.files_scrubbed += 1;
            match self.verify_at(&path, &expected) {
                Ok(()) => continue,
                Err(Error::IntegrityMismatch { .. }) => stats.files_corrupted += 1,
                Err(e) => return Err(e),
            }

            self.cache.invalidate(Some(&path));
            match self.recover_file_at(&path, &expected) {
                Ok(_) => stats.files_repaired += 1,
                Err(Error::UnrecoverableCorruption { .. }) => {
                    warn!("scrub: {} is corrupted and has no matching backup", path);
                    stats.files_unrepairable += 1;
                }
                Err(e) => return Err(e),
            }
        }

        stats.end_time = format::now();
        info!(
            "Scrub finished: {} files, {} corrupted, {} repaired, {} unrepairable",
            stats.files_scrubbed, stats.files_corrupted, stats.files_repaired, stats.files_unrepairable
        );
        Ok(stats)
    }
}

/// Virtual path of a physical path under `root`
fn virtual_path(root: &Path, physical: &Path) -> Option<String> {
    let relative = physical.strip_prefix(root).ok()?;
    let mut path = String::new();
    for component in relative.components() {
        path.push('/');
        path.push_str(component.as_os_str().to_str()?);
    }
    if path.is_empty() {
        path.push_str(ROOT);
    }
    Some(path)
}

fn modified_time(path: &Path) -> NaiveDateTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).naive_local())
        .unwrap_or_else(|_| format::now())
}
