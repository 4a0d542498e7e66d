//! Metadata document store.
//!
//! `DocumentIndex` is the backend contract (create/get/update/delete/search
//! plus index and version management). `MetadataStore` binds a backend to one
//! index name, gates on the backend version at connect time, and is what the
//! entity layer talks to. The store knows nothing about access lists; entities
//! check permissions before calling it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PodaciError, Result};

pub mod elastic;
pub mod memory;
pub mod query;

pub use elastic::ElasticIndex;
pub use memory::MemoryIndex;
pub use query::Query;

/// Document kinds held in the index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    File,
    Tag,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::File => "file",
            DocKind::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(DocKind::File),
            "tag" => Some(DocKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A single stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub kind: DocKind,
    /// Known for direct gets; search hits may not carry it.
    pub version: Option<u64>,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchHits {
    /// Total number of matching documents, which may exceed `hits.len()`.
    pub total: u64,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub version: u64,
    /// True when no-op detection found nothing to change and the version was kept.
    pub noop: bool,
}

/// Backend contract for a searchable document index.
pub trait DocumentIndex: Send + Sync {
    /// Version string reported by the server, e.g. "7.17.3".
    fn server_version(&self) -> Result<String>;

    fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create `index`. An index that already exists is not an error.
    fn create_index(&self, index: &str) -> Result<()>;

    /// Store a new document; the backend assigns the id. Returns (id, version).
    fn create(&self, index: &str, kind: DocKind, body: &Value) -> Result<(String, u64)>;

    fn get(&self, index: &str, kind: DocKind, id: &str) -> Result<Hit>;

    /// Merge the top-level fields of `doc` into the stored document.
    fn update(&self, index: &str, kind: DocKind, id: &str, doc: &Value, detect_noop: bool) -> Result<UpdateOutcome>;

    fn delete(&self, index: &str, kind: DocKind, id: &str) -> Result<()>;

    /// Run `query`, optionally restricted to one kind. `size` caps the returned hits.
    fn search(&self, index: &str, kind: Option<DocKind>, query: &Query, from: usize, size: usize) -> Result<SearchHits>;
}

/// Numeric components of a version string; stops at the first non-numeric part ("8.0.0-rc1" -> [8, 0, 0]).
pub fn parse_version(v: &str) -> Vec<u64> {
    let mut out = Vec::new();
    for part in v.trim().split('.') {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        match digits.parse::<u64>() {
            Ok(n) => out.push(n),
            Err(_) => break,
        }
        if digits.len() != part.len() { break; }
    }
    out
}

/// True when `found` >= `required`, comparing components with missing ones as zero.
pub fn version_at_least(found: &str, required: &str) -> bool {
    let f = parse_version(found);
    let r = parse_version(required);
    if f.is_empty() { return false; }
    let n = f.len().max(r.len());
    for i in 0..n {
        let a = f.get(i).copied().unwrap_or(0);
        let b = r.get(i).copied().unwrap_or(0);
        if a != b { return a > b; }
    }
    true
}

/// A backend bound to one index.
#[derive(Clone)]
pub struct MetadataStore {
    backend: Arc<dyn DocumentIndex>,
    index: String,
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore").field("index", &self.index).finish()
    }
}

impl MetadataStore {
    /// Verify the backend version and make sure `index` exists.
    pub fn connect(backend: Arc<dyn DocumentIndex>, index: &str, min_version: &str) -> Result<Self> {
        let found = backend.server_version()?;
        if !version_at_least(&found, min_version) {
            return Err(PodaciError::UnsupportedBackend { found, required: min_version.to_string() });
        }
        if !backend.index_exists(index)? {
            backend.create_index(index)?;
            info!(target: "podaci::index", "initialized index '{}' (backend {})", index, found);
        } else {
            debug!(target: "podaci::index", "using index '{}' (backend {})", index, found);
        }
        Ok(Self { backend, index: index.to_string() })
    }

    pub fn index_name(&self) -> &str { &self.index }

    pub fn create_document(&self, kind: DocKind, body: &Value) -> Result<(String, u64)> {
        let (id, version) = self.backend.create(&self.index, kind, body)?;
        debug!(target: "podaci::index", "create {} id={} version={}", kind, id, version);
        Ok((id, version))
    }

    pub fn update_document(&self, kind: DocKind, id: &str, partial: &Value, detect_noop: bool) -> Result<UpdateOutcome> {
        let out = self.backend.update(&self.index, kind, id, partial, detect_noop)?;
        debug!(target: "podaci::index", "update {} id={} version={} noop={}", kind, id, out.version, out.noop);
        Ok(out)
    }

    pub fn get_document(&self, kind: DocKind, id: &str) -> Result<Hit> {
        self.backend.get(&self.index, kind, id)
    }

    pub fn delete_document(&self, kind: DocKind, id: &str) -> Result<()> {
        self.backend.delete(&self.index, kind, id)?;
        debug!(target: "podaci::index", "delete {} id={}", kind, id);
        Ok(())
    }

    pub fn query(&self, kind: Option<DocKind>, query: &Query, from: usize, size: usize) -> Result<SearchHits> {
        self.backend.search(&self.index, kind, query, from, size)
    }

    /// True when at least one document of `kind` matches.
    pub fn exists(&self, kind: DocKind, query: &Query) -> Result<bool> {
        Ok(self.backend.search(&self.index, Some(kind), query, 0, 1)?.total > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison() {
        assert!(version_at_least("7.17.3", "7.0.0"));
        assert!(version_at_least("7.0", "7.0.0"));
        assert!(version_at_least("8.0.0-SNAPSHOT", "7.10"));
        assert!(!version_at_least("6.8.23", "7.0.0"));
        assert!(!version_at_least("1.3.9", "1.4.0"));
        assert!(!version_at_least("garbage", "1.0.0"));
        assert_eq!(parse_version("8.0.0-rc1"), vec![8, 0, 0]);
    }

    #[test]
    fn connect_rejects_old_backend() {
        let backend = Arc::new(MemoryIndex::with_reported_version("1.3.0"));
        let err = MetadataStore::connect(backend, "podaci", "1.4.0").unwrap_err();
        assert!(matches!(err, PodaciError::UnsupportedBackend { .. }));
    }

    #[test]
    fn connect_creates_index_once() {
        let backend = Arc::new(MemoryIndex::new());
        assert!(!backend.index_exists("cases").unwrap());
        MetadataStore::connect(backend.clone(), "cases", "7.0.0").unwrap();
        assert!(backend.index_exists("cases").unwrap());
        // second connect sees the existing index
        MetadataStore::connect(backend.clone(), "cases", "7.0.0").unwrap();
        backend.create_index("cases").unwrap();
    }

    #[test]
    fn kind_names_round_trip() {
        for k in [DocKind::File, DocKind::Tag] {
            assert_eq!(DocKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(DocKind::parse("folder"), None);
    }
}
