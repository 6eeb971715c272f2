//! Content checksums for MetaFS
//!
//! Every file record stores a digest of its physical content taken right after
//! the content was written. Reads recompute the digest and compare; a mismatch
//! sends the file through per-file recovery.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use ring::digest;
use serde::{Deserialize, Serialize};

/// Read buffer size for streaming digests (64KB)
const CHUNK_SIZE: usize = 64 * 1024;

/// Checksum algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// CRC32 checksum (fast, 32-bit)
    Crc32,
    /// SHA-256 digest (collision resistant)
    #[default]
    Sha256,
}

enum Hasher {
    Crc32(crc32fast::Hasher),
    Sha256(digest::Context),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Crc32 => Hasher::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(digest::Context::new(&digest::SHA256)),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Crc32(h) => h.update(data),
            Hasher::Sha256(ctx) => ctx.update(data),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Hasher::Crc32(h) => format!("{:08x}", h.finalize()),
            Hasher::Sha256(ctx) => hex::encode(ctx.finish().as_ref()),
        }
    }
}

/// Calculate checksum for in-memory data
pub fn checksum_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finish_hex()
}

/// Calculate checksum of a physical file, streaming it in chunks
pub fn checksum_file(algorithm: ChecksumAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish_hex())
}

/// SHA-256 of `data` as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}
