//! Sidecar cache for built artifacts.
//!
//! Each artifact is a pair of files in the git directory: `<name>.cache`
//! holds the payload, `<name>.check` holds the refs key it was built
//! against. Loads recompute nothing: a stale key, a missing file, a bad
//! magic, a CRC mismatch, or a failed decompression all read as a miss and
//! the caller rebuilds. The `.check` sidecar is written strictly after the
//! `.cache` payload so a torn write can only produce a miss.
//!
//! Payload layout: `b"XREF"`, format version (u32 BE), CRC32 of the
//! compressed body (u32 BE), zlib-compressed body.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use xref_hash::ObjectId;

use crate::RepoError;

const MAGIC: &[u8; 4] = b"XREF";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

/// Key-checked cache in a repository's git directory.
pub struct CacheStore {
    dir: PathBuf,
    key: ObjectId,
    force_rebuild: bool,
    skip: bool,
}

impl CacheStore {
    pub fn new(dir: PathBuf, key: ObjectId) -> Self {
        Self {
            dir,
            key,
            force_rebuild: false,
            skip: false,
        }
    }

    /// Ignore existing entries (they are still rewritten after rebuild).
    pub fn force_rebuild(mut self, yes: bool) -> Self {
        self.force_rebuild = yes;
        self
    }

    /// Neither read nor write the cache.
    pub fn skip(mut self, yes: bool) -> Self {
        self.skip = yes;
        self
    }

    fn cache_path(&self, artifact: &str) -> PathBuf {
        self.dir.join(format!("{artifact}.cache"))
    }

    fn check_path(&self, artifact: &str) -> PathBuf {
        self.dir.join(format!("{artifact}.check"))
    }

    /// Load an artifact's payload, or `None` on any kind of miss.
    pub fn load(&self, artifact: &str) -> Option<Vec<u8>> {
        if self.skip || self.force_rebuild {
            return None;
        }
        let stored_key = fs::read(self.check_path(artifact)).ok()?;
        if stored_key != self.key.as_bytes() {
            return None;
        }
        read_payload(&self.cache_path(artifact))
    }

    /// Write an artifact. Callers treat failures as non-fatal; the result
    /// of the run never depends on the cache being writable.
    pub fn store(&self, artifact: &str, payload: &[u8]) -> Result<(), RepoError> {
        if self.skip {
            return Ok(());
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload)?;
        let compressed = encoder.finish()?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&compressed);

        let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_be_bytes());
        bytes.extend_from_slice(&crc.finalize().to_be_bytes());
        bytes.extend_from_slice(&compressed);

        // Temp file in the same directory, then rename: readers never see a
        // half-written payload. The check file goes last.
        let cache_path = self.cache_path(artifact);
        let tmp_path = self.dir.join(format!("{artifact}.cache.tmp"));
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &cache_path)?;
        fs::write(self.check_path(artifact), self.key.as_bytes())?;
        Ok(())
    }
}

fn read_payload(path: &Path) -> Option<Vec<u8>> {
    let data = fs::read(path).ok()?;
    if data.len() < HEADER_LEN || &data[0..4] != MAGIC {
        return None;
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != VERSION {
        return None;
    }
    let expected_crc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    let compressed = &data[HEADER_LEN..];

    let mut crc = crc32fast::Hasher::new();
    crc.update(compressed);
    if crc.finalize() != expected_crc {
        return None;
    }

    let mut payload = Vec::new();
    ZlibDecoder::new(compressed).read_to_end(&mut payload).ok()?;
    Some(payload)
}
