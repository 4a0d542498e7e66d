//! The `FileSystem` handle: one metadata store, one content store and an
//! optional acting user, passed explicitly to every entity.
//!
//! Handles are cheap to clone. `with_user` derives a handle for another user
//! over the same stores.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::EffectiveConfig;
use crate::content::ContentStore;
use crate::correlation::CorrelationId;
use crate::error::{PodaciError, Result};
use crate::file::{CreateOutcome, File};
use crate::identity::Principal;
use crate::index::{DocKind, DocumentIndex, MetadataStore, Query};
use crate::tag::Tag;

/// Fields searched by `search_all_by_name`.
pub const NAME_SEARCH_FIELDS: &[&str] = &["name", "title", "identifier", "description", "filename"];

/// Which of a user's tags to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagScope {
    All,
    /// Direct children of the given tag id.
    Under(String),
    /// Tags without parents.
    TopLevel,
}

/// One row of a name search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchItem {
    pub id: String,
    pub kind: DocKind,
    pub name: String,
}

#[derive(Clone)]
pub struct FileSystem {
    meta: MetadataStore,
    content: ContentStore,
    user: Option<Principal>,
    config: Arc<EffectiveConfig>,
    corr: CorrelationId,
    http: reqwest::blocking::Client,
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("index", &self.meta.index_name())
            .field("root", &self.content.root())
            .field("user", &self.user)
            .field("corr", &self.corr.as_str())
            .finish()
    }
}

impl FileSystem {
    /// Connect to `backend` (version gate + ensure index) and open the content root.
    pub fn connect(config: EffectiveConfig, backend: Arc<dyn DocumentIndex>, user: Option<Principal>) -> Result<Self> {
        let meta = MetadataStore::connect(backend, &config.index_name, &config.min_backend_version)?;
        let content = ContentStore::from_config(&config)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        let fs = Self { meta, content, user, config: Arc::new(config), corr: CorrelationId::new(), http };
        debug!(target: "podaci::fs", "connected index={} root='{}'{}", fs.meta.index_name(), fs.content.root().display(), fs.corr_suffix());
        Ok(fs)
    }

    /// Same stores, different acting user.
    pub fn with_user(&self, user: Principal) -> Self {
        Self { user: Some(user), ..self.clone() }
    }

    pub fn without_user(&self) -> Self {
        Self { user: None, ..self.clone() }
    }

    pub fn with_correlation(mut self, corr: CorrelationId) -> Self {
        self.corr = corr;
        self
    }

    pub fn user(&self) -> Option<&Principal> { self.user.as_ref() }

    pub fn require_user(&self) -> Result<Principal> {
        self.user.clone().ok_or(PodaciError::Unauthenticated)
    }

    pub fn config(&self) -> &EffectiveConfig { &self.config }
    pub fn content(&self) -> &ContentStore { &self.content }
    pub fn meta(&self) -> &MetadataStore { &self.meta }
    pub(crate) fn http(&self) -> &reqwest::blocking::Client { &self.http }

    pub(crate) fn corr_suffix(&self) -> String { format!(" [corr={}]", self.corr) }

    fn page_size(&self, size: usize) -> usize { size.min(self.config.list_cap) }

    // ---- creation ----

    pub fn create_file_from_bytes<R: Read>(&self, filename: &str, reader: R) -> Result<CreateOutcome> {
        File::create_from_reader(self, filename, reader)
    }

    pub fn create_file_from_path(&self, path: &Path) -> Result<CreateOutcome> {
        File::create_from_path(self, path)
    }

    pub fn create_file_from_url(&self, url: &str, make_resident: bool) -> Result<CreateOutcome> {
        File::create_from_url(self, url, make_resident)
    }

    pub fn create_tag(&self, name: &str) -> Result<Tag> {
        Tag::create(self, name)
    }

    // ---- lookups ----

    pub fn get_file_by_id(&self, id: &str) -> Result<File> {
        File::load(self, id)
    }

    pub fn get_file_by_hash(&self, hash: &str) -> Result<File> {
        self.find_file_by_hash(hash)?.ok_or_else(|| PodaciError::not_found("file", hash))
    }

    pub(crate) fn find_file_by_hash(&self, hash: &str) -> Result<Option<File>> {
        let found = self.meta.query(Some(DocKind::File), &Query::term("hash", hash), 0, 1)?;
        match found.hits.into_iter().next() {
            Some(hit) => Ok(Some(File::from_hit(self, hit.id, hit.source)?)),
            None => Ok(None),
        }
    }

    pub fn file_exists_by_hash(&self, hash: &str) -> Result<bool> {
        self.meta.exists(DocKind::File, &Query::term("hash", hash))
    }

    pub fn file_exists_by_url(&self, url: &str) -> Result<bool> {
        self.meta.exists(DocKind::File, &Query::term("url", url))
    }

    pub fn get_tag(&self, id: &str) -> Result<Tag> {
        Tag::load(self, id)
    }

    // ---- listings ----

    /// Tags `user` can read, narrowed by `scope`.
    pub fn list_user_tags(&self, user: &Principal, scope: TagScope, from: usize, size: usize) -> Result<(u64, Vec<Tag>)> {
        let mut must = vec![Query::term("allowed_users", user.user_id.as_str())];
        match scope {
            TagScope::All => {}
            TagScope::Under(parent) => must.push(Query::term("parents", parent)),
            TagScope::TopLevel => must.push(Query::missing("parents")),
        }
        let found = self.meta.query(Some(DocKind::Tag), &Query::all_of(must), from, self.page_size(size))?;
        let tags = found.hits.into_iter().map(|h| Tag::from_hit(self, h.id, h.source)).collect::<Result<Vec<_>>>()?;
        Ok((found.total, tags))
    }

    /// Files `user` can read, optionally only those carrying `tag`.
    pub fn list_user_files(&self, user: &Principal, tag: Option<&str>, from: usize, size: usize) -> Result<(u64, Vec<File>)> {
        let mut must = vec![Query::term("allowed_users", user.user_id.as_str())];
        if let Some(t) = tag {
            must.push(Query::term("tags", t));
        }
        self.search_files(&Query::all_of(must), from, size)
    }

    /// Files carrying exactly `tag`. Membership is not inherited through parents.
    pub fn list_files(&self, tag: &str, from: usize, size: usize) -> Result<(u64, Vec<File>)> {
        self.search_files(&Query::term("tags", tag), from, size)
    }

    pub fn search_files(&self, query: &Query, from: usize, size: usize) -> Result<(u64, Vec<File>)> {
        let found = self.meta.query(Some(DocKind::File), query, from, self.page_size(size))?;
        let files = found.hits.into_iter().map(|h| File::from_hit(self, h.id, h.source)).collect::<Result<Vec<_>>>()?;
        Ok((found.total, files))
    }

    /// Fuzzy match over names, titles, identifiers, descriptions and filenames of files and tags.
    pub fn search_all_by_name(&self, text: &str, from: usize, size: usize) -> Result<Vec<SearchItem>> {
        let found = self.meta.query(None, &Query::fuzzy(text, NAME_SEARCH_FIELDS), from, self.page_size(size))?;
        Ok(found
            .hits
            .into_iter()
            .map(|h| {
                let name = display_name(&h.source);
                SearchItem { id: h.id, kind: h.kind, name }
            })
            .collect())
    }
}

fn display_name(source: &Value) -> String {
    let field = |k: &str| source.get(k).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty());
    field("name").or_else(|| field("filename")).unwrap_or_default().to_string()
}
