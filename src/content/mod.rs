//! Content store: resident file bytes on local disk, addressed by SHA-256.
//!
//! Bytes are streamed in fixed-size blocks into a staging file under
//! `<root>/.staging` while the digest is computed, then moved to
//! `<root>/ab/cd/ef/<hash>/<filename>`. Identical content always lands on the
//! same path, so concurrent writers of the same bytes overwrite each other
//! harmlessly and different content can never collide.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::EffectiveConfig;
use crate::error::{PodaciError, Result};

pub mod host_path;
pub mod paths;

pub use host_path::{is_host_path_allowed, normalize_abs_path};
pub use paths::{hash_dir, resident_path, validate_filename, validate_hash};

/// Hex SHA-256 of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hex SHA-256 of a reader, consumed in `block_size` chunks. Returns (digest, byte count).
pub fn sha256_reader<R: Read>(mut reader: R, block_size: usize) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Bytes written to the staging area and hashed, not yet placed at their final path.
/// Dropping an uncommitted blob removes the staging file.
#[derive(Debug)]
pub struct StagedBlob {
    path: Option<PathBuf>,
    pub hash: String,
    pub size: u64,
    /// Leading bytes kept for MIME sniffing.
    pub head: Vec<u8>,
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if let Some(p) = self.path.take() {
            let _ = fs::remove_file(p);
        }
    }
}

/// Location of committed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub hash: String,
    pub size: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    block_size: usize,
    sniff_bytes: usize,
}

impl ContentStore {
    /// Open a content store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, block_size: usize, sniff_bytes: usize) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, block_size: block_size.max(1), sniff_bytes })
    }

    pub fn from_config(eff: &EffectiveConfig) -> Result<Self> {
        Self::new(eff.data_root.clone(), eff.hash_block_size, eff.sniff_bytes)
    }

    pub fn root(&self) -> &Path { &self.root }

    fn staging_dir(&self) -> PathBuf { self.root.join(".staging") }

    /// Stream `reader` into a staging file while hashing it.
    pub fn stage<R: Read>(&self, mut reader: R) -> Result<StagedBlob> {
        let dir = self.staging_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(Uuid::new_v4().to_string());
        let mut out = fs::File::create(&path)?;
        // From here on the staging file is cleaned up by Drop if anything fails.
        let mut staged = StagedBlob { path: Some(path), hash: String::new(), size: 0, head: Vec::new() };

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.block_size];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let block = &buf[..n];
            hasher.update(block);
            out.write_all(block)?;
            if staged.head.len() < self.sniff_bytes {
                let take = (self.sniff_bytes - staged.head.len()).min(n);
                staged.head.extend_from_slice(&block[..take]);
            }
            staged.size += n as u64;
        }
        out.flush()?;
        out.sync_all()?;
        staged.hash = format!("{:x}", hasher.finalize());
        debug!(target: "podaci::content", "staged {} bytes hash={}", staged.size, staged.hash);
        Ok(staged)
    }

    /// Move staged bytes to their hash-derived location under `filename`.
    pub fn commit(&self, mut staged: StagedBlob, filename: &str) -> Result<StoredBlob> {
        let dest = self.location(&staged.hash, filename)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let src = staged.path.take().ok_or(PodaciError::MissingField("staged path"))?;
        if dest.exists() {
            // same hash + same name means the same bytes are already in place
            let _ = fs::remove_file(&src);
        } else if let Err(e) = fs::rename(&src, &dest) {
            let _ = fs::remove_file(&src);
            return Err(e.into());
        }
        debug!(target: "podaci::content", "committed hash={} path='{}'", staged.hash, dest.display());
        Ok(StoredBlob { hash: staged.hash.clone(), size: staged.size, path: dest })
    }

    /// Stage and commit in one step.
    pub fn put<R: Read>(&self, reader: R, filename: &str) -> Result<StoredBlob> {
        // validate before spending IO on the stream
        validate_filename(filename)?;
        let staged = self.stage(reader)?;
        self.commit(staged, filename)
    }

    pub fn location(&self, hash: &str, filename: &str) -> Result<PathBuf> {
        resident_path(&self.root, hash, filename)
    }

    /// True when any bytes are stored for `hash`.
    pub fn exists(&self, hash: &str) -> bool {
        match hash_dir(&self.root, hash) {
            Ok(dir) => fs::read_dir(dir).map(|mut rd| rd.next().is_some()).unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn open(&self, hash: &str, filename: &str) -> Result<fs::File> {
        let path = self.location(hash, filename)?;
        fs::File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PodaciError::FileNotFound(path.display().to_string()),
            _ => e.into(),
        })
    }

    /// Best-effort removal. Returns whether a file was removed; a missing file is not an error.
    pub fn delete(&self, hash: &str, filename: &str) -> Result<bool> {
        let path = self.location(hash, filename)?;
        let removed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        // drop the per-hash directory once it is empty; shard dirs are left in place
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir(dir);
        }
        debug!(target: "podaci::content", "delete hash={} filename='{}' removed={}", hash, filename, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod content_tests;
