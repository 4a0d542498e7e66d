use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const MIB: u64 = 1024 * 1024;

/// Built-in defaults applied unless a config file or the environment overrides them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    pub index_name: String,
    /// Root folder for resident file bytes.
    pub data_root: PathBuf,
    /// Base URL of an Elasticsearch server; None selects the local snapshot index.
    pub index_url: Option<String>,
    pub min_backend_version: String,
    /// Prefix of the human-readable file identifier (`<prefix>-<abbr>-<hash6>`).
    pub identifier_prefix: String,
    pub hash_block_size: usize,
    /// Number of leading bytes handed to the MIME sniffer.
    pub sniff_bytes: usize,
    pub bundle_max_bytes: u64,
    /// Upper bound on results returned by a single listing call.
    pub list_cap: usize,
    /// Ask the index to make writes visible to search before returning.
    pub refresh_on_write: bool,
    /// Optional ';' or ',' separated list of absolute path prefixes for local ingestion.
    pub host_path_allowlist: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            index_name: "podaci".to_string(),
            data_root: PathBuf::from("data"),
            index_url: None,
            min_backend_version: "7.0.0".to_string(),
            identifier_prefix: "ID".to_string(),
            hash_block_size: 64 * 1024,
            sniff_bytes: 100,
            bundle_max_bytes: 50 * MIB,
            list_cap: 1000,
            refresh_on_write: true,
            host_path_allowlist: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// Partial configuration. Unspecified values inherit from the layer below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigOverrides {
    pub index_name: Option<String>,
    pub data_root: Option<PathBuf>,
    pub index_url: Option<String>,
    pub min_backend_version: Option<String>,
    pub identifier_prefix: Option<String>,
    pub hash_block_size: Option<usize>,
    pub sniff_bytes: Option<usize>,
    pub bundle_max_bytes: Option<u64>,
    pub list_cap: Option<usize>,
    pub refresh_on_write: Option<bool>,
    pub host_path_allowlist: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Load overrides from a JSON file such as `podaci.json`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read `PODACI_*` environment variables. Unparseable numbers are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let num = |name: &str| get(name).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |name: &str| {
            get(name).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        };
        Self {
            index_name: get("PODACI_INDEX"),
            data_root: get("PODACI_DATA_ROOT").map(PathBuf::from),
            index_url: get("PODACI_INDEX_URL").filter(|s| !s.trim().is_empty()),
            min_backend_version: get("PODACI_MIN_BACKEND_VERSION"),
            identifier_prefix: get("PODACI_ID_PREFIX"),
            hash_block_size: num("PODACI_HASH_BLOCK_SIZE").map(|v| v as usize),
            sniff_bytes: num("PODACI_SNIFF_BYTES").map(|v| v as usize),
            bundle_max_bytes: num("PODACI_BUNDLE_MAX_BYTES"),
            list_cap: num("PODACI_LIST_CAP").map(|v| v as usize),
            refresh_on_write: flag("PODACI_REFRESH_ON_WRITE"),
            host_path_allowlist: get("PODACI_HOST_PATH_ALLOWLIST"),
            request_timeout_ms: num("PODACI_REQUEST_TIMEOUT_MS"),
        }
    }

    /// Overlay `self` on top of `lower`; values set in `self` win.
    fn over(self, lower: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            index_name: self.index_name.or(lower.index_name),
            data_root: self.data_root.or(lower.data_root),
            index_url: self.index_url.or(lower.index_url),
            min_backend_version: self.min_backend_version.or(lower.min_backend_version),
            identifier_prefix: self.identifier_prefix.or(lower.identifier_prefix),
            hash_block_size: self.hash_block_size.or(lower.hash_block_size),
            sniff_bytes: self.sniff_bytes.or(lower.sniff_bytes),
            bundle_max_bytes: self.bundle_max_bytes.or(lower.bundle_max_bytes),
            list_cap: self.list_cap.or(lower.list_cap),
            refresh_on_write: self.refresh_on_write.or(lower.refresh_on_write),
            host_path_allowlist: self.host_path_allowlist.or(lower.host_path_allowlist),
            request_timeout_ms: self.request_timeout_ms.or(lower.request_timeout_ms),
        }
    }
}

/// Fully resolved config used by the store handles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveConfig {
    pub index_name: String,
    pub data_root: PathBuf,
    pub index_url: Option<String>,
    pub min_backend_version: String,
    pub identifier_prefix: String,
    pub hash_block_size: usize,
    pub sniff_bytes: usize,
    pub bundle_max_bytes: u64,
    pub list_cap: usize,
    pub refresh_on_write: bool,
    pub host_path_allowlist: Option<String>,
    pub request_timeout_ms: u64,
}

impl EffectiveConfig {
    /// Build an effective config from defaults + optional file layer + optional env layer.
    pub fn from_layers(global: &GlobalConfig, file: Option<&ConfigOverrides>, env: Option<&ConfigOverrides>) -> Self {
        let file = file.cloned().unwrap_or_default();
        let merged = env.cloned().unwrap_or_default().over(file);
        Self {
            index_name: merged.index_name.unwrap_or_else(|| global.index_name.clone()),
            data_root: merged.data_root.unwrap_or_else(|| global.data_root.clone()),
            index_url: merged.index_url.or_else(|| global.index_url.clone()),
            min_backend_version: merged.min_backend_version.unwrap_or_else(|| global.min_backend_version.clone()),
            identifier_prefix: merged.identifier_prefix.unwrap_or_else(|| global.identifier_prefix.clone()),
            // a zero block size would never make progress
            hash_block_size: merged.hash_block_size.filter(|n| *n > 0).unwrap_or(global.hash_block_size),
            sniff_bytes: merged.sniff_bytes.unwrap_or(global.sniff_bytes),
            bundle_max_bytes: merged.bundle_max_bytes.unwrap_or(global.bundle_max_bytes),
            list_cap: merged.list_cap.unwrap_or(global.list_cap),
            refresh_on_write: merged.refresh_on_write.unwrap_or(global.refresh_on_write),
            host_path_allowlist: merged.host_path_allowlist.or_else(|| global.host_path_allowlist.clone()),
            request_timeout_ms: merged.request_timeout_ms.unwrap_or(global.request_timeout_ms),
        }
    }

    /// Defaults with the content root moved to `data_root`; handy for tests and embedding.
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        let mut eff = Self::from_layers(&GlobalConfig::default(), None, None);
        eff.data_root = data_root.into();
        eff
    }

    /// Where the local snapshot index lives when no server URL is configured.
    pub fn local_index_dir(&self) -> PathBuf {
        self.data_root.join(".index")
    }
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self::from_layers(&GlobalConfig::default(), None, None)
    }
}
