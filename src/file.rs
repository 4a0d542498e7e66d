//! File entity: a metadata record plus, for resident files, bytes in the content store.
//!
//! Records move from unsaved (no id) to indexed. Indexed files are either
//! resident (bytes stored locally under their hash) or referenced by URL only.
//! Every mutation checks write access first, changes the cached record, logs
//! it and writes the whole record through to the index.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::content::{is_host_path_allowed, normalize_abs_path, sha256_hex, validate_filename};
use crate::error::{PodaciError, Result};
use crate::filesystem::FileSystem;
use crate::identity::Principal;
use crate::index::DocKind;
use crate::mime;
use crate::permissions::{PermissionedDocument, SyncableDocument};
use crate::records::{insert_unique, remove_value, AccessControl, ChangelogEntry, FileRecord, Note};

/// Result of a create call. `created` is false when an existing record was reused
/// or, for URLs, when the URL was already registered (then `file` is None).
#[derive(Debug)]
pub struct CreateOutcome {
    pub file: Option<File>,
    pub created: bool,
}

impl CreateOutcome {
    pub fn id(&self) -> Option<&str> { self.file.as_ref().and_then(|f| f.id()) }

    pub fn meta(&self) -> Option<&FileRecord> { self.file.as_ref().map(|f| f.meta()) }
}

/// `<prefix>-<abbr>-<last 6 hex>`.
pub fn make_identifier(prefix: &str, user: &Principal, hash: &str) -> String {
    let tail = &hash[hash.len().saturating_sub(6)..];
    format!("{}-{}-{}", prefix, user.abbreviation(), tail)
}

#[derive(Clone)]
pub struct File {
    fs: FileSystem,
    id: Option<String>,
    meta: FileRecord,
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File").field("id", &self.id).field("meta", &self.meta).finish()
    }
}

impl File {
    pub(crate) fn from_hit(fs: &FileSystem, id: String, source: Value) -> Result<Self> {
        Ok(Self { fs: fs.clone(), id: Some(id), meta: serde_json::from_value(source)? })
    }

    /// Load an indexed file.
    pub fn load(fs: &FileSystem, id: &str) -> Result<Self> {
        let hit = fs.meta().get_document(DocKind::File, id)?;
        Self::from_hit(fs, hit.id, hit.source)
    }

    /// Store the bytes of `reader` as `filename`, or reuse the record that already holds them.
    pub fn create_from_reader<R: Read>(fs: &FileSystem, filename: &str, reader: R) -> Result<CreateOutcome> {
        let user = fs.require_user()?;
        let filename = validate_filename(filename)?;
        let staged = fs.content().stage(reader)?;

        if let Some(mut existing) = fs.find_file_by_hash(&staged.hash)? {
            // staged bytes are dropped with `staged`
            existing.grant_duplicate_reader(&user)?;
            warn!(
                target: "podaci::file",
                "file exists: hash={} id={} reused for user={}{}",
                staged.hash,
                existing.id().unwrap_or("-"),
                user.user_id,
                fs.corr_suffix()
            );
            return Ok(CreateOutcome { file: Some(existing), created: false });
        }

        let mut meta = FileRecord {
            access: AccessControl::owned_by(&user.user_id),
            identifier: make_identifier(&fs.config().identifier_prefix, &user, &staged.hash),
            created_by: user.user_id.clone(),
            mimetype: mime::sniff(&staged.head, &filename),
            hash: staged.hash.clone(),
            filename,
            ..Default::default()
        };
        meta.changelog.push(ChangelogEntry { date: Utc::now(), user: user.user_id.clone(), message: "Created".into() });

        let blob = fs.content().commit(staged, &meta.filename)?;
        meta.size = blob.size;
        meta.is_resident = true;

        let (id, _) = fs.meta().create_document(DocKind::File, &serde_json::to_value(&meta)?)?;
        debug!(
            target: "podaci::file",
            "created file id={} identifier={} size={} mimetype={}{}",
            id, meta.identifier, meta.size, meta.mimetype, fs.corr_suffix()
        );
        Ok(CreateOutcome { file: Some(Self { fs: fs.clone(), id: Some(id), meta }), created: true })
    }

    /// Ingest a local file. Subject to the host path allowlist when one is configured.
    pub fn create_from_path(fs: &FileSystem, path: &Path) -> Result<CreateOutcome> {
        fs.require_user()?;
        if let Some(list) = fs.config().host_path_allowlist.as_deref() {
            if !is_host_path_allowed(path, list)? {
                return Err(PodaciError::HostPathNotAllowed(normalize_abs_path(path)?.display().to_string()));
            }
        }
        if !path.is_file() {
            return Err(PodaciError::FileNotFound(path.display().to_string()));
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PodaciError::InvalidFilename(path.display().to_string()))?;
        let reader = std::fs::File::open(path)?;
        Self::create_from_reader(fs, &filename, reader)
    }

    /// Register a remote file by URL. The bytes are not fetched, so duplicates are
    /// detected by exact URL only.
    pub fn create_from_url(fs: &FileSystem, url: &str, make_resident: bool) -> Result<CreateOutcome> {
        let user = fs.require_user()?;
        let url = url.trim();
        if url.is_empty() {
            return Err(PodaciError::MissingField("url"));
        }
        if make_resident {
            return Err(PodaciError::Unsupported("making remote files resident"));
        }
        if fs.file_exists_by_url(url)? {
            warn!(target: "podaci::file", "url already registered: {}{}", url, fs.corr_suffix());
            return Ok(CreateOutcome { file: None, created: false });
        }
        let filename = url_filename(url);
        let mut meta = FileRecord {
            access: AccessControl::owned_by(&user.user_id),
            // no content hash yet; the url digest keeps identifiers distinct
            identifier: make_identifier(&fs.config().identifier_prefix, &user, &sha256_hex(url.as_bytes())),
            created_by: user.user_id.clone(),
            mimetype: mime::extension(&filename)
                .as_deref()
                .and_then(mime::from_extension)
                .unwrap_or(mime::OCTET_STREAM)
                .to_string(),
            url: url.to_string(),
            filename,
            ..Default::default()
        };
        meta.changelog.push(ChangelogEntry { date: Utc::now(), user: user.user_id.clone(), message: "Created".into() });
        let (id, _) = fs.meta().create_document(DocKind::File, &serde_json::to_value(&meta)?)?;
        debug!(target: "podaci::file", "registered url id={} url={}{}", id, url, fs.corr_suffix());
        Ok(CreateOutcome { file: Some(Self { fs: fs.clone(), id: Some(id), meta }), created: true })
    }

    pub fn meta(&self) -> &FileRecord { &self.meta }

    /// Apply `f` to the record and write it through.
    pub fn update_meta<F: FnOnce(&mut FileRecord)>(&mut self, f: F) -> Result<()> {
        self.ensure_write()?;
        f(&mut self.meta);
        self.sync()
    }

    /// Re-read the stored record, dropping local changes.
    pub fn refresh(&mut self) -> Result<()> {
        let id = self.id.clone().ok_or(PodaciError::MissingField("id"))?;
        let hit = self.fs.meta().get_document(DocKind::File, &id)?;
        self.meta = serde_json::from_value(hit.source)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(json!({ "id": self.id, "meta": serde_json::to_value(&self.meta)? }))
    }

    /// Where the bytes live (or would live) in the content store.
    pub fn resource_location(&self) -> Result<PathBuf> {
        if self.meta.hash.is_empty() {
            return Err(PodaciError::MissingField("hash"));
        }
        if self.meta.filename.is_empty() {
            return Err(PodaciError::MissingField("filename"));
        }
        self.fs.content().location(&self.meta.hash, &self.meta.filename)
    }

    /// A reader over the file's bytes: local for resident files, fetched for URL-only ones.
    pub fn get(&self) -> Result<Box<dyn Read + Send>> {
        self.ensure_read()?;
        if self.meta.is_resident {
            let f = self.fs.content().open(&self.meta.hash, &self.meta.filename)?;
            return Ok(Box::new(f));
        }
        if self.meta.url.is_empty() {
            return Err(PodaciError::MissingField("url"));
        }
        let resp = self.fs.http().get(&self.meta.url).send()?.error_for_status()?;
        Ok(Box::new(resp))
    }

    /// Promotion of URL-only files to resident storage.
    pub fn make_resident(&mut self) -> Result<()> {
        Err(PodaciError::Unsupported("making remote files resident"))
    }

    pub fn add_tag(&mut self, tag_id: &str) -> Result<()> {
        self.ensure_write()?;
        if !insert_unique(&mut self.meta.tags, tag_id) {
            return Ok(());
        }
        self.log(&format!("Added tag {}", tag_id), false)?;
        self.sync()?;
        debug!(target: "podaci::file", "tag add id={:?} tag={}{}", self.id, tag_id, self.fs.corr_suffix());
        Ok(())
    }

    pub fn remove_tag(&mut self, tag_id: &str) -> Result<()> {
        self.ensure_write()?;
        if !remove_value(&mut self.meta.tags, tag_id) {
            return Err(PodaciError::absent("tags", tag_id));
        }
        self.log(&format!("Removed tag {}", tag_id), false)?;
        self.sync()?;
        debug!(target: "podaci::file", "tag remove id={:?} tag={}{}", self.id, tag_id, self.fs.corr_suffix());
        Ok(())
    }

    pub fn add_note(&mut self, text: &str) -> Result<()> {
        let user = self.ensure_write()?;
        let now = Utc::now();
        self.meta.notes.push(Note { user: user.user_id, created: now, modified: now, text: text.to_string(), score: 0 });
        self.log("Added a note", false)?;
        self.sync()
    }

    /// Remove the index document and, best effort, the stored bytes.
    pub fn delete(&mut self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(PodaciError::ConfirmationRequired("delete a file"));
        }
        let id = self.id.clone().ok_or(PodaciError::MissingField("id"))?;
        self.ensure_write()?;
        if self.meta.is_resident && !self.meta.hash.is_empty() && !self.meta.filename.is_empty() {
            if let Err(e) = self.fs.content().delete(&self.meta.hash, &self.meta.filename) {
                warn!(target: "podaci::file", "could not remove bytes for id={}: {}{}", id, e, self.fs.corr_suffix());
            }
        }
        self.fs.meta().delete_document(DocKind::File, &id)?;
        self.id = None;
        debug!(target: "podaci::file", "deleted file id={}{}", id, self.fs.corr_suffix());
        Ok(())
    }

    /// Thumbnails are not generated for any type.
    pub fn thumbnail(&self, _width: u32, _height: u32) -> Option<Vec<u8>> { None }

    /// Always empty while no thumbnails exist.
    pub fn thumbnail_img_tag(&self) -> String { String::new() }

    // Adding the creator of identical bytes as a reader is done on behalf of the
    // record; they do not need write access to it.
    fn grant_duplicate_reader(&mut self, user: &Principal) -> Result<()> {
        if !insert_unique(&mut self.meta.access.allowed_users, &user.user_id) {
            return Ok(());
        }
        self.meta.changelog.push(ChangelogEntry {
            date: Utc::now(),
            user: user.user_id.clone(),
            message: format!("Gave read access to {} on duplicate upload", user.display_name()),
        });
        self.persist().map(|_| ())
    }
}

/// Last path segment of a URL, query and fragment removed.
fn url_filename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let last = path.split_once('/').map(|(_, p)| p).unwrap_or("").rsplit('/').find(|s| !s.is_empty()).unwrap_or("");
    validate_filename(last).unwrap_or_default()
}

impl PermissionedDocument for File {
    fn access(&self) -> &AccessControl { &self.meta.access }
    fn access_mut(&mut self) -> &mut AccessControl { &mut self.meta.access }
}

impl SyncableDocument for File {
    const KIND: DocKind = DocKind::File;

    fn id(&self) -> Option<&str> { self.id.as_deref() }
    fn fs(&self) -> &FileSystem { &self.fs }
    fn body(&self) -> Result<Value> { Ok(serde_json::to_value(&self.meta)?) }
    fn changelog_mut(&mut self) -> &mut Vec<ChangelogEntry> { &mut self.meta.changelog }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[File {}] filename='{}' title='{}', mimetype='{}', tags='{:?}', is_resident='{}'.",
            self.id.as_deref().unwrap_or("-"),
            self.meta.filename,
            self.meta.title,
            self.meta.mimetype,
            self.meta.tags,
            self.meta.is_resident
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_uses_hash_tail() {
        let u = Principal::new("7", "smari");
        assert_eq!(make_identifier("ID", &u, "abcdef0123456789"), "ID-SMA-456789");
        assert_eq!(make_identifier("ID", &u, "abc"), "ID-SMA-abc");
    }

    #[test]
    fn url_filenames() {
        assert_eq!(url_filename("https://example.org/docs/report.pdf?x=1"), "report.pdf");
        assert_eq!(url_filename("https://example.org/docs/"), "docs");
        assert_eq!(url_filename("https://example.org"), "");
        assert_eq!(url_filename("https://example.org/a/%2e%2e"), "%2e%2e");
    }
}
