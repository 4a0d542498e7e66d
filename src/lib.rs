pub mod config;
pub mod content;
pub mod correlation;
pub mod error;
pub mod file;
pub mod filesystem;
pub mod identity;
pub mod index;
pub mod mime;
pub mod permissions;
pub mod records;
pub mod tag;

pub use config::{ConfigOverrides, EffectiveConfig, GlobalConfig};
pub use error::{PodaciError, Result};
pub use file::{CreateOutcome, File};
pub use filesystem::{FileSystem, SearchItem, TagScope};
pub use identity::Principal;
pub use index::{DocKind, DocumentIndex, ElasticIndex, MemoryIndex, Query};
pub use permissions::{PermissionedDocument, SyncableDocument};
pub use records::{FileRecord, TagRecord};
pub use tag::{BundleOutcome, Tag};
