//! In-process document index.
//!
//! Documents live in a `parking_lot::RwLock`ed map per index name. An optional
//! bincode snapshot under a directory gives the CLI persistence between runs;
//! bodies are stored as JSON bytes inside the snapshot since bincode cannot
//! encode `serde_json::Value` directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{PodaciError, Result};
use crate::index::{DocKind, DocumentIndex, Hit, Query, SearchHits, UpdateOutcome};

/// Version reported to the connect gate unless overridden.
pub const MEMORY_INDEX_VERSION: &str = "7.10.0";

const SNAPSHOT_FILE: &str = "snapshot.bin";

#[derive(Clone)]
struct StoredDoc {
    kind: DocKind,
    version: u64,
    /// Insertion order, used as the tie-breaker when ranking.
    seq: u64,
    etag: u64,
    body: Value,
}

#[derive(Default)]
struct IndexData {
    docs: HashMap<String, StoredDoc>,
    next_seq: u64,
}

fn etag_for(body: &Value) -> u64 {
    // serde_json maps are ordered, so equal documents serialize identically
    xxh3_64(&serde_json::to_vec(body).unwrap_or_default())
}

#[derive(Serialize, Deserialize)]
struct SnapDoc {
    index: String,
    id: String,
    kind: DocKind,
    version: u64,
    seq: u64,
    body: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    created_ms: i64,
    indices: Vec<String>,
    docs: Vec<SnapDoc>,
}

#[derive(Clone)]
pub struct MemoryIndex {
    reported_version: String,
    map: Arc<RwLock<HashMap<String, IndexData>>>,
    dir: Option<PathBuf>,
}

impl Default for MemoryIndex {
    fn default() -> Self { Self::new() }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self { reported_version: MEMORY_INDEX_VERSION.to_string(), map: Arc::new(RwLock::new(HashMap::new())), dir: None }
    }

    /// Report `version` from `server_version`, to exercise the connect gate.
    pub fn with_reported_version(version: &str) -> Self {
        Self { reported_version: version.to_string(), ..Self::new() }
    }

    /// Index persisted under `dir`; an existing snapshot is loaded.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let s = Self { dir: Some(dir.to_path_buf()), ..Self::new() };
        s.load_snapshot()?;
        Ok(s)
    }

    fn snapshot_path(&self) -> Option<PathBuf> { self.dir.as_ref().map(|d| d.join(SNAPSHOT_FILE)) }

    /// Write all indices to disk. A no-op for indices created with `new`.
    pub fn save_snapshot(&self) -> Result<()> {
        let Some(path) = self.snapshot_path() else { return Ok(()) };
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        let mut docs = Vec::new();
        let mut indices = Vec::new();
        {
            let r = self.map.read();
            for (index, data) in r.iter() {
                indices.push(index.clone());
                for (id, d) in data.docs.iter() {
                    docs.push(SnapDoc {
                        index: index.clone(),
                        id: id.clone(),
                        kind: d.kind,
                        version: d.version,
                        seq: d.seq,
                        body: serde_json::to_vec(&d.body)?,
                    });
                }
            }
        }
        let count = docs.len();
        let snap = Snapshot { version: 1, created_ms: now_ms, indices, docs };
        let bytes = bincode::serialize(&snap)?;
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, &path)?;
        debug!(target: "podaci::index", "saved snapshot docs={} path='{}'", count, path.display());
        Ok(())
    }

    /// Replace in-memory state with the snapshot on disk, if one exists.
    pub fn load_snapshot(&self) -> Result<()> {
        let Some(path) = self.snapshot_path() else { return Ok(()) };
        if !path.exists() { return Ok(()); }
        let bytes = std::fs::read(&path)?;
        let snap: Snapshot = bincode::deserialize(&bytes)?;
        let mut fresh: HashMap<String, IndexData> = HashMap::new();
        for name in snap.indices {
            fresh.entry(name).or_default();
        }
        for d in snap.docs {
            let body: Value = serde_json::from_slice(&d.body)?;
            let data = fresh.entry(d.index).or_default();
            data.next_seq = data.next_seq.max(d.seq + 1);
            data.docs.insert(d.id, StoredDoc { kind: d.kind, version: d.version, seq: d.seq, etag: etag_for(&body), body });
        }
        *self.map.write() = fresh;
        Ok(())
    }

    /// Number of documents in `index`.
    pub fn len(&self, index: &str) -> usize {
        self.map.read().get(index).map(|d| d.docs.len()).unwrap_or(0)
    }
}

impl DocumentIndex for MemoryIndex {
    fn server_version(&self) -> Result<String> { Ok(self.reported_version.clone()) }

    fn index_exists(&self, index: &str) -> Result<bool> { Ok(self.map.read().contains_key(index)) }

    fn create_index(&self, index: &str) -> Result<()> {
        self.map.write().entry(index.to_string()).or_default();
        Ok(())
    }

    fn create(&self, index: &str, kind: DocKind, body: &Value) -> Result<(String, u64)> {
        if !body.is_object() {
            return Err(PodaciError::Backend { status: 400, message: "document body must be an object".into() });
        }
        let id = Uuid::new_v4().simple().to_string();
        let mut w = self.map.write();
        let data = w.entry(index.to_string()).or_default();
        let seq = data.next_seq;
        data.next_seq += 1;
        data.docs.insert(id.clone(), StoredDoc { kind, version: 1, seq, etag: etag_for(body), body: body.clone() });
        Ok((id, 1))
    }

    fn get(&self, index: &str, kind: DocKind, id: &str) -> Result<Hit> {
        let r = self.map.read();
        let d = r
            .get(index)
            .and_then(|data| data.docs.get(id))
            .filter(|d| d.kind == kind)
            .ok_or_else(|| PodaciError::not_found(kind.as_str(), id))?;
        Ok(Hit { id: id.to_string(), kind, version: Some(d.version), source: d.body.clone() })
    }

    fn update(&self, index: &str, kind: DocKind, id: &str, doc: &Value, detect_noop: bool) -> Result<UpdateOutcome> {
        let partial = doc
            .as_object()
            .ok_or_else(|| PodaciError::Backend { status: 400, message: "partial document must be an object".into() })?;
        let mut w = self.map.write();
        let d = w
            .get_mut(index)
            .and_then(|data| data.docs.get_mut(id))
            .filter(|d| d.kind == kind)
            .ok_or_else(|| PodaciError::not_found(kind.as_str(), id))?;
        let mut merged = d.body.clone();
        if let Some(obj) = merged.as_object_mut() {
            for (k, v) in partial {
                obj.insert(k.clone(), v.clone());
            }
        }
        let etag = etag_for(&merged);
        if detect_noop && etag == d.etag {
            return Ok(UpdateOutcome { version: d.version, noop: true });
        }
        d.body = merged;
        d.etag = etag;
        d.version += 1;
        Ok(UpdateOutcome { version: d.version, noop: false })
    }

    fn delete(&self, index: &str, kind: DocKind, id: &str) -> Result<()> {
        let mut w = self.map.write();
        let data = w.get_mut(index).ok_or_else(|| PodaciError::not_found(kind.as_str(), id))?;
        if !data.docs.get(id).is_some_and(|d| d.kind == kind) {
            return Err(PodaciError::not_found(kind.as_str(), id));
        }
        data.docs.remove(id);
        Ok(())
    }

    fn search(&self, index: &str, kind: Option<DocKind>, query: &Query, from: usize, size: usize) -> Result<SearchHits> {
        let r = self.map.read();
        let Some(data) = r.get(index) else { return Ok(SearchHits::default()) };
        let mut scored: Vec<(f64, u64, &String, &StoredDoc)> = data
            .docs
            .iter()
            .filter(|(_, d)| kind.map(|k| k == d.kind).unwrap_or(true))
            .filter_map(|(id, d)| query.score(&d.body).map(|s| (s, d.seq, id, d)))
            .collect();
        // best score first, then oldest first
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        let total = scored.len() as u64;
        let hits = scored
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(_, _, id, d)| Hit { id: id.clone(), kind: d.kind, version: Some(d.version), source: d.body.clone() })
            .collect();
        Ok(SearchHits { total, hits })
    }
}

#[cfg(test)]
mod memory_tests;
