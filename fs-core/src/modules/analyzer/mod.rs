//! Performance analysis for MetaFS
//!
//! Reports block usage and fragmentation from the file table, then runs a
//! small live benchmark: a handful of random files are rewritten with
//! same-length synthetic content and read back. The benchmark really
//! overwrites those files.

use std::time::Instant;

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::error::Result;
use crate::vfs::FileSystemManager;

/// Maximum number of files the benchmark touches
const SAMPLE_SIZE: usize = 5;

/// Byte used for synthetic benchmark content
const SYNTHETIC_BYTE: u8 = b'x';

/// File system statistics and benchmark timings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub total_files: usize,
    pub total_directories: usize,
    pub used_blocks: u64,
    pub free_blocks: u64,
    pub total_blocks: u64,
    /// Mean per-file fragmentation score, 0 (contiguous) to 1
    pub average_fragmentation: f64,
    /// Mean read time over the sampled files, in seconds
    pub average_read_time: f64,
    /// Mean write time over the sampled files, in seconds
    pub average_write_time: f64,
    /// Files the benchmark rewrote
    pub sampled_files: Vec<String>,
    pub cache: CacheStats,
    /// Share of cache lookups that hit, see [`CacheStats::hit_ratio`]
    pub cache_hit_ratio: f64,
}

/// Fraction of adjacent block pairs that are not sequential.
///
/// Lists of zero or one block score 0.
pub fn fragmentation_score(blocks: &[u64]) -> f64 {
    if blocks.len() <= 1 {
        return 0.0;
    }
    let breaks = blocks.windows(2).filter(|pair| pair[1] != pair[0] + 1).count();
    breaks as f64 / (blocks.len() - 1) as f64
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

impl FileSystemManager {
    /// Analyze the file system, sampling files with the thread-local RNG
    pub fn analyze_performance(&mut self) -> Result<PerformanceReport> {
        self.analyze_performance_with_rng(&mut rand::thread_rng())
    }

    /// Analyze the file system, sampling files with `rng`
    pub fn analyze_performance_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<PerformanceReport> {
        let total_files = self.table.file_count();
        let total_directories = self.table.directory_count();
        let used_blocks = self.table.used_block_count();
        let free_blocks = self.allocator.free_count();

        let average_fragmentation = if total_files == 0 {
            0.0
        } else {
            self.table
                .files()
                .values()
                .map(|record| fragmentation_score(&record.blocks))
                .sum::<f64>()
                / total_files as f64
        };

        let candidates: Vec<(String, u64)> = self
            .table
            .files()
            .values()
            .map(|record| (record.path.clone(), record.size))
            .collect();
        let sample: Vec<(String, u64)> = candidates
            .choose_multiple(rng, SAMPLE_SIZE)
            .cloned()
            .collect();

        let mut write_times = Vec::with_capacity(sample.len());
        let mut read_times = Vec::with_capacity(sample.len());
        for (path, size) in &sample {
            let content = vec![SYNTHETIC_BYTE; *size as usize];

            let start = Instant::now();
            self.write_file(path, &content)?;
            write_times.push(start.elapsed().as_secs_f64());

            let start = Instant::now();
            self.read_file(path)?;
            read_times.push(start.elapsed().as_secs_f64());
            debug!("analyze_performance: benchmarked {}", path);
        }

        let report = PerformanceReport {
            total_files,
            total_directories,
            used_blocks,
            free_blocks,
            total_blocks: used_blocks + free_blocks,
            average_fragmentation,
            average_read_time: mean(&read_times),
            average_write_time: mean(&write_times),
            sampled_files: sample.into_iter().map(|(path, _)| path).collect(),
            cache: self.cache.stats(),
            cache_hit_ratio: self.cache.stats().hit_ratio(),
        };
        info!(
            "Performance: {} files, fragmentation {:.3}, read {:.6}s, write {:.6}s",
            report.total_files, report.average_fragmentation, report.average_read_time, report.average_write_time
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fragmentation_score() {
        assert_eq!(fragmentation_score(&[]), 0.0);
        assert_eq!(fragmentation_score(&[7]), 0.0);
        assert_eq!(fragmentation_score(&[1, 2, 3, 4]), 0.0);
        assert_eq!(fragmentation_score(&[1, 3, 5]), 1.0);
        assert_eq!(fragmentation_score(&[1, 2, 9, 10, 4]), 0.5);
    }

    #[test]
    fn test_report_counts_and_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = FileSystemManager::open(FsConfig::new(dir.path())).unwrap();
        fs.create_directory("/d").unwrap();
        for i in 0..7 {
            fs.write_file(&format!("/d/f{i}.txt"), format!("content {i}").as_bytes()).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(7);
        let report = fs.analyze_performance_with_rng(&mut rng).unwrap();
        assert_eq!(report.total_files, 7);
        assert_eq!(report.total_directories, 2);
        assert_eq!(report.used_blocks, 7);
        assert_eq!(report.total_blocks, 1000);
        assert_eq!(report.average_fragmentation, 0.0);
        assert_eq!(report.sampled_files.len(), SAMPLE_SIZE);
        // Each benchmark read follows a write that filled the cache
        assert_eq!(report.cache.hits, SAMPLE_SIZE as u64);
        assert_eq!(report.cache_hit_ratio, 1.0);

        // Sampled files now hold synthetic content of the same length
        for path in &report.sampled_files {
            let content = fs.read_file(path).unwrap();
            assert!(content.iter().all(|&b| b == SYNTHETIC_BYTE));
            assert_eq!(content.len() as u64, fs.stat(path).unwrap().size);
        }
        assert!(fs.audit().is_empty());
    }

    #[test]
    fn test_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = FileSystemManager::open(FsConfig::new(dir.path())).unwrap();
        let report = fs.analyze_performance().unwrap();
        assert_eq!(report.total_files, 0);
        assert_eq!(report.average_read_time, 0.0);
        assert!(report.sampled_files.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_directories"], 1);
        assert!(json["cache"]["hits"].is_u64());
        assert_eq!(json["cache_hit_ratio"], 0.0);
    }
}
