//! Error types for the API client.

use thiserror::Error;

/// Top-level result type for API client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Top-level error type for the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("a {kind} named '{name}' already exists here")]
    DuplicateName { kind: NodeKind, name: String },

    #[error("'{name}' maps to storage key '{key}', already used by sibling '{existing}'")]
    KeyCollision {
        name: String,
        existing: String,
        key: String,
    },

    #[error("invalid name '{0}'")]
    InvalidName(String),

    #[error("structural violation: {0}")]
    Structural(String),

    #[error("index {index} out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Serialization(e.to_string())
    }
}

/// Failures reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Backend(String),
}

impl StorageError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(path.to_string())
            }
            _ => StorageError::Io {
                path: path.to_string(),
                source,
            },
        }
    }
}

/// Which kind of tree node an error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Collection,
    Folder,
    Request,
    Environment,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Collection => "collection",
            NodeKind::Folder => "folder",
            NodeKind::Request => "request",
            NodeKind::Environment => "environment",
        };
        f.write_str(s)
    }
}
