//! Metadata snapshot store for MetaFS
//!
//! The whole metadata state is persisted as one JSON document. Before a new
//! snapshot overwrites the current one, the current one is copied into the
//! backup directory under a dated name, so there is always at least one older
//! generation to step back to.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoContext, Result};
use crate::format::MetadataSnapshot;
use crate::layout::Layout;

/// Why the current snapshot could not be used
#[derive(Debug)]
pub enum LoadOutcome {
    /// No snapshot on disk yet
    Missing,
    /// Snapshot read and parsed
    Loaded(MetadataSnapshot),
    /// Snapshot present but unreadable or unparsable
    Corrupt(Error),
}

/// Reads and writes metadata snapshots and their dated backups
#[derive(Debug, Clone)]
pub struct MetadataStore {
    layout: Layout,
    max_backups: Option<usize>,
}

impl MetadataStore {
    /// Create a store for the given layout
    pub fn new(layout: Layout, max_backups: Option<usize>) -> Self {
        Self {
            layout,
            max_backups,
        }
    }

    /// Path of the current snapshot
    pub fn path(&self) -> &Path {
        &self.layout.metadata_file
    }

    /// Read the current snapshot
    pub fn load(&self) -> LoadOutcome {
        let path = &self.layout.metadata_file;
        match fs::read(path) {
            Ok(raw) => match parse(&raw) {
                Ok(snapshot) => LoadOutcome::Loaded(snapshot),
                Err(e) => LoadOutcome::Corrupt(e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LoadOutcome::Missing,
            Err(e) => LoadOutcome::Corrupt(Error::Persistence {
                context: "reading metadata",
                path: path.clone(),
                source: e,
            }),
        }
    }

    /// Persist `snapshot`, first copying the existing snapshot to a dated backup.
    ///
    /// Returns the backup that was written, if any.
    pub fn save(&self, snapshot: &MetadataSnapshot) -> Result<Option<PathBuf>> {
        let current = &self.layout.metadata_file;
        let backup = if current.exists() {
            let backup = self.layout.new_metadata_backup_path();
            fs::copy(current, &backup).persist_ctx("backing up metadata", &backup)?;
            log::debug!("MetadataStore: previous snapshot saved as {}", backup.display());
            self.prune()?;
            Some(backup)
        } else {
            None
        };

        self.write(snapshot)?;
        Ok(backup)
    }

    /// Overwrite the current snapshot without backing it up.
    ///
    /// Used after recovery, when the file being replaced is known to be corrupt.
    pub fn overwrite(&self, snapshot: &MetadataSnapshot) -> Result<()> {
        self.write(snapshot)
    }

    /// Metadata backups, newest first
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let mut backups = self.layout.metadata_backups()?;
        backups.reverse();
        Ok(backups)
    }

    /// Read one backup generation
    pub fn load_backup(&self, path: &Path) -> Result<MetadataSnapshot> {
        let raw = fs::read(path).persist_ctx("reading metadata backup", path)?;
        parse(&raw)
    }

    fn write(&self, snapshot: &MetadataSnapshot) -> Result<()> {
        let path = &self.layout.metadata_file;
        let json = serde_json::to_vec_pretty(snapshot)?;

        // Write to a sibling and rename so a crash never leaves a torn snapshot
        let tmp = self.layout.metadata_staging_file();
        fs::write(&tmp, &json).persist_ctx("writing metadata", &tmp)?;
        fs::rename(&tmp, path).persist_ctx("replacing metadata", path)?;
        Ok(())
    }

    fn prune(&self) -> Result<()> {
        let Some(max) = self.max_backups else {
            return Ok(());
        };
        let backups = self.layout.metadata_backups()?;
        if backups.len() <= max {
            return Ok(());
        }
        for old in &backups[..backups.len() - max] {
            fs::remove_file(old).persist_ctx("pruning metadata backup", old)?;
            log::debug!("MetadataStore: pruned {}", old.display());
        }
        Ok(())
    }
}

fn parse(raw: &[u8]) -> Result<MetadataSnapshot> {
    let mut snapshot: MetadataSnapshot = serde_json::from_slice(raw)?;
    snapshot.fixup_file_ids();
    Ok(snapshot)
}
