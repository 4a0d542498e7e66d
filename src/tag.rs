//! Tag entity and the zip bundle builder.
//!
//! Tags form a DAG through their `parents` lists. Files reference tags by id,
//! and listing a tag's files matches that id only: children and parents are
//! not folded in.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Cursor};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PodaciError, Result};
use crate::file::File;
use crate::filesystem::FileSystem;
use crate::index::DocKind;
use crate::permissions::{PermissionedDocument, SyncableDocument};
use crate::records::{insert_unique, remove_value, AccessControl, ChangelogEntry, TagRecord};

/// Result of `build_zip_bundle`. Exceeding the size budget is a refusal, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOutcome {
    Archive(Vec<u8>),
    TooLarge { total_bytes: u64, limit_bytes: u64 },
}

#[derive(Clone)]
pub struct Tag {
    fs: FileSystem,
    id: Option<String>,
    meta: TagRecord,
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag").field("id", &self.id).field("meta", &self.meta).finish()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Tag {}] name='{}' parents='{:?}'.", self.id.as_deref().unwrap_or("-"), self.meta.name, self.meta.parents)
    }
}

impl Tag {
    pub(crate) fn from_hit(fs: &FileSystem, id: String, source: Value) -> Result<Self> {
        Ok(Self { fs: fs.clone(), id: Some(id), meta: serde_json::from_value(source)? })
    }

    pub fn load(fs: &FileSystem, id: &str) -> Result<Self> {
        let hit = fs.meta().get_document(DocKind::Tag, id)?;
        Self::from_hit(fs, hit.id, hit.source)
    }

    /// Create and index a tag owned by the acting user.
    pub fn create(fs: &FileSystem, name: &str) -> Result<Self> {
        let user = fs.require_user()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PodaciError::MissingField("name"));
        }
        let mut meta = TagRecord { name: name.to_string(), access: AccessControl::owned_by(&user.user_id), ..Default::default() };
        meta.changelog.push(ChangelogEntry { date: Utc::now(), user: user.user_id.clone(), message: "Created".into() });
        let (id, _) = fs.meta().create_document(DocKind::Tag, &serde_json::to_value(&meta)?)?;
        debug!(target: "podaci::tag", "created tag id={} name='{}'{}", id, meta.name, fs.corr_suffix());
        Ok(Self { fs: fs.clone(), id: Some(id), meta })
    }

    pub fn meta(&self) -> &TagRecord { &self.meta }

    pub fn name(&self) -> &str { &self.meta.name }

    pub fn to_json(&self) -> Result<Value> {
        Ok(json!({ "id": self.id, "meta": serde_json::to_value(&self.meta)? }))
    }

    pub fn refresh(&mut self) -> Result<()> {
        let id = self.id.clone().ok_or(PodaciError::MissingField("id"))?;
        let hit = self.fs.meta().get_document(DocKind::Tag, &id)?;
        self.meta = serde_json::from_value(hit.source)?;
        Ok(())
    }

    pub fn delete(&mut self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(PodaciError::ConfirmationRequired("delete a tag"));
        }
        let id = self.id.clone().ok_or(PodaciError::MissingField("id"))?;
        self.ensure_write()?;
        self.fs.meta().delete_document(DocKind::Tag, &id)?;
        self.id = None;
        debug!(target: "podaci::tag", "deleted tag id={}{}", id, self.fs.corr_suffix());
        Ok(())
    }

    pub fn add_parent(&mut self, parent_id: &str) -> Result<()> {
        self.ensure_write()?;
        if !insert_unique(&mut self.meta.parents, parent_id) {
            return Ok(());
        }
        self.log(&format!("Added parent {}", parent_id), false)?;
        self.sync()
    }

    pub fn remove_parent(&mut self, parent_id: &str) -> Result<()> {
        self.ensure_write()?;
        if !remove_value(&mut self.meta.parents, parent_id) {
            return Err(PodaciError::absent("parents", parent_id));
        }
        self.log(&format!("Removed parent {}", parent_id), false)?;
        self.sync()
    }

    /// Files carrying this tag, up to the configured list cap. Later pages are not reachable here.
    pub fn list_files(&self) -> Result<(u64, Vec<File>)> {
        self.ensure_read()?;
        let id = self.id.as_deref().ok_or(PodaciError::MissingField("id"))?;
        self.fs.list_files(id, 0, self.fs.config().list_cap)
    }

    /// Zip every file carrying this tag, or refuse when their sizes add up past the budget.
    ///
    /// Assembly stops at the first member that cannot be read (no read access,
    /// URL-only, or bytes missing); a partial archive is never returned.
    pub fn build_zip_bundle(&self) -> Result<BundleOutcome> {
        let (_, files) = self.list_files()?;
        let limit = self.fs.config().bundle_max_bytes;
        // sizes come from stored metadata; an overflowing sum is simply too large
        let total = files.iter().fold(0u64, |acc, f| acc.saturating_add(f.meta().size));
        if total > limit {
            debug!(target: "podaci::tag", "bundle refused id={:?} total={} limit={}{}", self.id, total, limit, self.fs.corr_suffix());
            return Ok(BundleOutcome::TooLarge { total_bytes: total, limit_bytes: limit });
        }

        let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut used: HashSet<String> = HashSet::new();
        for file in &files {
            if !file.meta().is_resident {
                return Err(PodaciError::Unsupported("bundling files that are not resident"));
            }
            let mut reader = file.get()?;
            let name = unique_entry_name(&mut used, &file.meta().filename);
            zw.start_file(name, opts)?;
            io::copy(&mut reader, &mut zw)?;
        }
        let bytes = zw.finish()?.into_inner();
        debug!(target: "podaci::tag", "bundle built id={:?} files={} bytes={}{}", self.id, files.len(), bytes.len(), self.fs.corr_suffix());
        Ok(BundleOutcome::Archive(bytes))
    }
}

/// `name`, or `stem (n).ext` when an earlier entry already took it.
fn unique_entry_name(used: &mut HashSet<String>, name: &str) -> String {
    let base = if name.is_empty() { "unnamed" } else { name };
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let (stem, ext) = match base.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, format!(".{}", e)),
        _ => (base, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

impl PermissionedDocument for Tag {
    fn access(&self) -> &AccessControl { &self.meta.access }
    fn access_mut(&mut self) -> &mut AccessControl { &mut self.meta.access }
}

impl SyncableDocument for Tag {
    const KIND: DocKind = DocKind::Tag;

    fn id(&self) -> Option<&str> { self.id.as_deref() }
    fn fs(&self) -> &FileSystem { &self.fs }
    fn body(&self) -> Result<Value> { Ok(serde_json::to_value(&self.meta)?) }
    fn changelog_mut(&mut self) -> &mut Vec<ChangelogEntry> { &mut self.meta.changelog }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_are_unique() {
        let mut used = HashSet::new();
        assert_eq!(unique_entry_name(&mut used, "a.txt"), "a.txt");
        assert_eq!(unique_entry_name(&mut used, "a.txt"), "a (2).txt");
        assert_eq!(unique_entry_name(&mut used, "a.txt"), "a (3).txt");
        assert_eq!(unique_entry_name(&mut used, "README"), "README");
        assert_eq!(unique_entry_name(&mut used, "README"), "README (2)");
        assert_eq!(unique_entry_name(&mut used, ""), "unnamed");
    }
}
