//! Defragmentation for MetaFS
//!
//! Renumbers the simulated block space so every file holds one contiguous
//! run, handed out in ascending path order. Content, sizes and checksums are
//! never touched; only block assignments move.

use log::{error, info};
use serde::Serialize;

use crate::error::Result;
use crate::format::FileRecord;
use crate::vfs::FileSystemManager;

/// Outcome of a defragmentation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DefragReport {
    /// Files whose block list changed
    pub files_relocated: usize,
    /// Size of the renumbered block space
    pub total_blocks: u64,
    /// Free blocks after the pass
    pub free_blocks: u64,
}

impl FileSystemManager {
    /// Reassign blocks so every file is contiguous.
    ///
    /// If the result cannot be persisted, both the file table and the
    /// allocator are put back exactly as they were.
    pub fn defragment(&mut self) -> Result<DefragReport> {
        info!("Starting defragmentation");
        let saved_table = self.table.clone();
        let saved_allocator = self.allocator.clone();

        let total_blocks = self.table.used_block_count() + self.allocator.free_count();
        self.allocator.reset(total_blocks);

        let mut order: Vec<(String, String)> = self
            .table
            .files()
            .values()
            .map(|record| (record.path.clone(), record.file_id.clone()))
            .collect();
        order.sort();

        let mut files_relocated = 0;
        for (_, file_id) in &order {
            let Some(record) = self.table.files_mut().get_mut(file_id) else {
                continue;
            };
            let needed = FileRecord::blocks_needed(record.size, self.block_size);
            let blocks = self.allocator.allocate(needed);
            if blocks != record.blocks {
                files_relocated += 1;
                record.blocks = blocks;
            }
        }

        if let Err(e) = self.save() {
            error!("Defragmentation failed, rolling back: {}", e);
            self.table = saved_table;
            self.allocator = saved_allocator;
            return Err(e);
        }

        let report = DefragReport {
            files_relocated,
            total_blocks,
            free_blocks: self.allocator.free_count(),
        };
        info!(
            "Defragmentation complete: {} files relocated, {} free blocks",
            report.files_relocated, report.free_blocks
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::FsConfig;
    use crate::modules::analyzer::fragmentation_score;
    use crate::vfs::FileSystemManager;

    #[test]
    fn test_defragment_makes_files_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = FileSystemManager::open(FsConfig::new(dir.path())).unwrap();
        fs.write_file("/a", &vec![1u8; 3 * 4096]).unwrap();
        fs.write_file("/b", &vec![2u8; 2 * 4096]).unwrap();
        // Freeing /a's run and regrowing it interleaves with the tail of the pool
        fs.write_file("/a", &vec![3u8; 5 * 4096]).unwrap();
        fs.delete_file("/b").unwrap();
        fs.write_file("/c", &vec![4u8; 4 * 4096]).unwrap();

        let report = fs.defragment().unwrap();
        assert_eq!(report.total_blocks, 1000);
        assert_eq!(report.free_blocks, 1000 - 9);

        assert_eq!(fs.stat("/a").unwrap().blocks, vec![1, 2, 3, 4, 5]);
        assert_eq!(fs.stat("/c").unwrap().blocks, vec![6, 7, 8, 9]);
        for path in ["/a", "/c"] {
            assert_eq!(fragmentation_score(&fs.stat(path).unwrap().blocks), 0.0);
        }
        assert!(fs.audit().is_empty());
    }

    #[test]
    fn test_defragment_empty_fs() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = FileSystemManager::open(FsConfig::new(dir.path())).unwrap();
        let report = fs.defragment().unwrap();
        assert_eq!(report.files_relocated, 0);
        assert_eq!(report.free_blocks, 1000);
    }

    #[test]
    fn test_failed_defragment_rolls_back_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = FileSystemManager::open(FsConfig::new(dir.path())).unwrap();
        fs.write_file("/a", &vec![1u8; 2 * 4096]).unwrap();
        fs.write_file("/b", b"b").unwrap();
        fs.delete_file("/a").unwrap();
        fs.write_file("/a", &vec![1u8; 2 * 4096]).unwrap();
        let table = fs.table().clone();
        let allocator = fs.allocator().clone();

        // A directory where the staging file goes makes the save fail
        std::fs::create_dir(fs.layout().metadata_staging_file()).unwrap();
        assert!(fs.defragment().is_err());
        assert_eq!(fs.table(), &table);
        assert_eq!(fs.allocator(), &allocator);
    }
}
