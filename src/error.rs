//! Unified error model for the document store and mapping helpers.
//! Entity operations, the content store and the index backends all report
//! through `PodaciError`; callers map it to their own protocol with
//! `code_str()` / `http_status()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PodaciError {
    #[error("no acting user is set")]
    Unauthenticated,

    #[error("user '{user}' has no {access} access to {kind} {id}")]
    PermissionDenied { user: String, access: &'static str, kind: &'static str, id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("refusing to {0} without explicit confirmation")]
    ConfirmationRequired(&'static str),

    #[error("index backend version {found} is older than the required {required}")]
    UnsupportedBackend { found: String, required: String },

    #[error("file does not exist: {0}")]
    FileNotFound(String),

    #[error("'{value}' is not present in {field}")]
    Absent { field: &'static str, value: String },

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("malformed content hash: {0}")]
    InvalidHash(String),

    #[error("host path is not allowed: {0}")]
    HostPathNotAllowed(String),

    #[error("not supported: {0}")]
    Unsupported(&'static str),

    #[error("index backend returned HTTP {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, PodaciError>;

impl PodaciError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PodaciError::NotFound { kind, id: id.into() }
    }

    pub fn absent(field: &'static str, value: impl Into<String>) -> Self {
        PodaciError::Absent { field, value: value.into() }
    }

    /// Stable machine-readable code.
    pub fn code_str(&self) -> &'static str {
        match self {
            PodaciError::Unauthenticated => "unauthenticated",
            PodaciError::PermissionDenied { .. } => "permission_denied",
            PodaciError::NotFound { .. } => "not_found",
            PodaciError::MissingField(_) => "missing_field",
            PodaciError::ConfirmationRequired(_) => "confirmation_required",
            PodaciError::UnsupportedBackend { .. } => "unsupported_backend",
            PodaciError::FileNotFound(_) => "file_not_found",
            PodaciError::Absent { .. } => "absent",
            PodaciError::InvalidFilename(_) => "invalid_filename",
            PodaciError::InvalidHash(_) => "invalid_hash",
            PodaciError::HostPathNotAllowed(_) => "host_path_not_allowed",
            PodaciError::Unsupported(_) => "unsupported",
            PodaciError::Backend { .. } => "backend_error",
            PodaciError::Transport(_) => "transport_error",
            PodaciError::Io(_) => "io_error",
            PodaciError::Json(_) => "json_error",
            PodaciError::Archive(_) => "archive_error",
            PodaciError::Snapshot(_) => "snapshot_error",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            PodaciError::Unauthenticated => 401,
            PodaciError::PermissionDenied { .. } | PodaciError::HostPathNotAllowed(_) => 403,
            PodaciError::NotFound { .. } | PodaciError::FileNotFound(_) => 404,
            PodaciError::MissingField(_)
            | PodaciError::ConfirmationRequired(_)
            | PodaciError::InvalidFilename(_)
            | PodaciError::InvalidHash(_)
            | PodaciError::Absent { .. } => 400,
            PodaciError::Unsupported(_) => 501,
            PodaciError::UnsupportedBackend { .. } | PodaciError::Transport(_) => 503,
            PodaciError::Backend { .. } => 502,
            PodaciError::Io(_)
            | PodaciError::Json(_)
            | PodaciError::Archive(_)
            | PodaciError::Snapshot(_) => 500,
        }
    }
}

#[cfg(test)]
mod error_tests;
