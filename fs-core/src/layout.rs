//! Physical layout of a MetaFS store
//!
//! A store is a real directory. Virtual files and directories live under it
//! at their virtual paths, next to the metadata snapshot file and a backup
//! directory. The backup directory holds two families of dated copies:
//!
//! - `metadata_backup_<stamp>.json`, whole-snapshot generations
//! - `<flattened path>_<stamp>`, per-file content generations
//!
//! Flattening percent-escapes `%` and `_` before turning `/` into `_`, so two
//! distinct virtual paths never share a backup prefix.
//!
//! Stamps sort chronologically as plain strings, so the newest generation is
//! always last in lexicographic order.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::config::FsConfig;
use crate::error::{IoContext, Result};
use crate::format;

/// Prefix for metadata snapshot backups
pub const METADATA_BACKUP_PREFIX: &str = "metadata_backup_";
/// Extension for metadata snapshot backups
const METADATA_BACKUP_SUFFIX: &str = ".json";
/// Timestamp format of backup suffixes, microsecond resolution
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Where everything of one store lives on disk
#[derive(Debug, Clone)]
pub struct Layout {
    /// Physical root of the virtual tree
    pub root: PathBuf,
    /// Metadata snapshot file
    pub metadata_file: PathBuf,
    /// Backup directory
    pub backup_dir: PathBuf,
}

impl Layout {
    /// Calculate the layout for the given configuration
    pub fn new(config: &FsConfig) -> Self {
        let root = config.root_dir.clone();
        Self {
            metadata_file: root.join(&config.metadata_file),
            backup_dir: root.join(&config.backup_dir),
            root,
        }
    }

    /// Create the root and backup directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.root).persist_ctx("creating store root", &self.root)?;
        fs::create_dir_all(&self.backup_dir).persist_ctx("creating backup directory", &self.backup_dir)?;
        Ok(())
    }

    /// Physical location of a normalized virtual path
    pub fn physical_path(&self, virtual_path: &str) -> PathBuf {
        let relative = virtual_path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Staging file a new snapshot is written to before it replaces the old one
    pub fn metadata_staging_file(&self) -> PathBuf {
        self.metadata_file.with_extension("json.tmp")
    }

    /// Whether a top-level entry name belongs to the store itself
    pub fn is_reserved(&self, name: &std::ffi::OsStr) -> bool {
        let name = Some(name);
        name == self.metadata_file.file_name()
            || name == self.backup_dir.file_name()
            || name == self.metadata_staging_file().file_name()
    }

    /// Whether a virtual path would address the snapshot, its staging file or
    /// the backup directory, or a directory containing one of them.
    ///
    /// The root itself is never reserved.
    pub fn is_reserved_path(&self, virtual_path: &str) -> bool {
        if virtual_path.trim_start_matches('/').is_empty() {
            return false;
        }
        let physical = self.physical_path(virtual_path);
        let staging = self.metadata_staging_file();
        let reserved = [&self.metadata_file, &staging, &self.backup_dir]
            .into_iter()
            .any(|own| physical.starts_with(own) || own.starts_with(&physical));
        reserved
    }

    /// Backup path for a metadata snapshot taken at `at`
    pub fn metadata_backup_path(&self, at: NaiveDateTime) -> PathBuf {
        self.backup_dir.join(format!(
            "{METADATA_BACKUP_PREFIX}{}{METADATA_BACKUP_SUFFIX}",
            at.format(STAMP_FORMAT)
        ))
    }

    /// Backup path for a file's content taken at `at`
    pub fn file_backup_path(&self, virtual_path: &str, at: NaiveDateTime) -> PathBuf {
        self.backup_dir
            .join(format!("{}{}", file_backup_prefix(virtual_path), at.format(STAMP_FORMAT)))
    }

    /// Unused metadata backup path stamped with the current time
    pub fn new_metadata_backup_path(&self) -> PathBuf {
        unused_path(|at| self.metadata_backup_path(at))
    }

    /// Unused content backup path for `virtual_path` stamped with the current time
    pub fn new_file_backup_path(&self, virtual_path: &str) -> PathBuf {
        unused_path(|at| self.file_backup_path(virtual_path, at))
    }

    /// Metadata backups, oldest first
    pub fn metadata_backups(&self) -> Result<Vec<PathBuf>> {
        self.backups_matching(|name| {
            name.strip_prefix(METADATA_BACKUP_PREFIX)
                .and_then(|rest| rest.strip_suffix(METADATA_BACKUP_SUFFIX))
                .is_some_and(is_stamp)
        })
    }

    /// Content backups of one file, oldest first
    pub fn file_backups(&self, virtual_path: &str) -> Result<Vec<PathBuf>> {
        let prefix = file_backup_prefix(virtual_path);
        self.backups_matching(|name| name.strip_prefix(prefix.as_str()).is_some_and(is_stamp))
    }

    fn backups_matching(&self, matches: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).persist_ctx("listing backups", &self.backup_dir),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.persist_ctx("listing backups", &self.backup_dir)?;
            let name = entry.file_name();
            if name.to_str().is_some_and(&matches) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Backup name prefix for a virtual path: separators flattened to `_`
pub fn file_backup_prefix(virtual_path: &str) -> String {
    let mut prefix = String::with_capacity(virtual_path.len() + 1);
    for c in virtual_path.trim_start_matches('/').chars() {
        match c {
            '%' => prefix.push_str("%25"),
            '_' => prefix.push_str("%5F"),
            '/' => prefix.push('_'),
            c => prefix.push(c),
        }
    }
    prefix.push('_');
    prefix
}

/// Two backups inside the same microsecond get consecutive stamps
fn unused_path(name_at: impl Fn(NaiveDateTime) -> PathBuf) -> PathBuf {
    let mut at = format::now();
    loop {
        let path = name_at(at);
        if !path.exists() {
            return path;
        }
        at += chrono::Duration::microseconds(1);
    }
}

fn is_stamp(s: &str) -> bool {
    NaiveDateTime::parse_from_str(s, STAMP_FORMAT).is_ok()
}
