//! Stored metadata records for files and tags.
//!
//! Records are versioned structs with `#[serde(default)]` on every field so
//! that documents written by older schema versions still load. Set-valued
//! fields (`tags`, `parents`, the access lists) are kept as `Vec<String>` in
//! insertion order and mutated only through `insert_unique` / `remove_value`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FILE_SCHEMA_VERSION: u32 = 2;
pub const TAG_SCHEMA_VERSION: u32 = 1;

/// Append to `set` unless already present. Returns true when inserted.
pub fn insert_unique(set: &mut Vec<String>, value: &str) -> bool {
    if set.iter().any(|v| v == value) {
        return false;
    }
    set.push(value.to_string());
    true
}

/// Remove every occurrence of `value`. Returns true when something was removed.
pub fn remove_value(set: &mut Vec<String>, value: &str) -> bool {
    let before = set.len();
    set.retain(|v| v != value);
    set.len() != before
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub date: DateTime<Utc>,
    pub user: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub user: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub score: i64,
}

/// Per-document read and write lists. The lists are independent: write access
/// does not imply read access.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccessControl {
    /// Carried for compatibility with stored documents; not consulted by access checks.
    pub public_read: bool,
    pub allowed_users: Vec<String>,
    pub allowed_write_users: Vec<String>,
}

impl AccessControl {
    /// Both lists seeded with the creator.
    pub fn owned_by(user_id: &str) -> Self {
        Self { public_read: false, allowed_users: vec![user_id.to_string()], allowed_write_users: vec![user_id.to_string()] }
    }

    pub fn can_read(&self, user_id: &str) -> bool { self.allowed_users.iter().any(|u| u == user_id) }

    pub fn can_write(&self, user_id: &str) -> bool { self.allowed_write_users.iter().any(|u| u == user_id) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileRecord {
    pub schema_version: u32,
    pub name: String,
    pub date_added: DateTime<Utc>,
    pub changelog: Vec<ChangelogEntry>,
    pub notes: Vec<Note>,
    #[serde(flatten)]
    pub access: AccessControl,
    /// Human-readable id, `<prefix>-<abbr>-<last 6 hex of hash>`.
    pub identifier: String,
    pub created_by: String,
    pub is_resident: bool,
    pub filename: String,
    pub url: String,
    pub title: String,
    pub hash: String,
    pub size: u64,
    pub tags: Vec<String>,
    pub mimetype: String,
    pub description: String,
    pub text: String,
    pub annotations: Vec<Value>,
    pub is_indexed: bool,
    /// Keys this version does not know about; written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for FileRecord {
    fn default() -> Self {
        Self {
            schema_version: FILE_SCHEMA_VERSION,
            name: String::new(),
            date_added: Utc::now(),
            changelog: Vec::new(),
            notes: Vec::new(),
            access: AccessControl::default(),
            identifier: String::new(),
            created_by: String::new(),
            is_resident: false,
            filename: String::new(),
            url: String::new(),
            title: String::new(),
            hash: String::new(),
            size: 0,
            tags: Vec::new(),
            mimetype: String::new(),
            description: String::new(),
            text: String::new(),
            annotations: Vec::new(),
            is_indexed: false,
            extra: Map::new(),
        }
    }
}

impl FileRecord {
    /// Name shown in listings: `name`, else `filename`.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() { &self.filename } else { &self.name }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TagRecord {
    pub schema_version: u32,
    pub name: String,
    pub date_added: DateTime<Utc>,
    pub changelog: Vec<ChangelogEntry>,
    pub notes: Vec<Note>,
    #[serde(flatten)]
    pub access: AccessControl,
    pub parents: Vec<String>,
    pub icon: String,
}

impl Default for TagRecord {
    fn default() -> Self {
        Self {
            schema_version: TAG_SCHEMA_VERSION,
            name: String::new(),
            date_added: Utc::now(),
            changelog: Vec::new(),
            notes: Vec::new(),
            access: AccessControl::default(),
            parents: Vec::new(),
            icon: "default".to_string(),
        }
    }
}
