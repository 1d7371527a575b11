//! Storage capability: the primitive durable operations the store is built on.
//!
//! Paths are `/`-separated and relative to the backend's root. There is no
//! multi-file atomicity; the store orders its writes so that an interrupted
//! operation leaves content reachable at the old or the new location.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use apiclient_core::error::{ApiError, StorageError};

/// Primitive file operations offered by a durable backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole document. `Ok(None)` when the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<String>, StorageError>;

    /// Create or replace a document, creating missing parent directories.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), StorageError>;

    /// Names of the immediate children of a directory, sorted.
    ///
    /// Fails with [`StorageError::NotFound`] when the directory does not exist.
    async fn list_children(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Create a directory and its parents. Already existing is not an error.
    async fn create_directory(&self, path: &str) -> Result<(), StorageError>;

    /// Remove a document. Removing a missing document succeeds.
    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;

    /// Remove a directory, with its contents when `recursive`. Missing succeeds.
    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<(), StorageError>;
}

/// Serialize a document the way every file in the layout is written.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

/// Read and parse a JSON document, `Ok(None)` when it does not exist.
pub async fn read_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    path: &str,
) -> Result<Option<T>, ApiError> {
    match storage.read_file(path).await? {
        Some(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ApiError::Serialization(format!("{path}: {e}"))),
        None => Ok(None),
    }
}

/// Children of `path`, or nothing when the directory does not exist.
pub async fn list_or_empty(storage: &dyn Storage, path: &str) -> Result<Vec<String>, StorageError> {
    match storage.list_children(path).await {
        Ok(children) => Ok(children),
        Err(StorageError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiclient_core::Workspace;

    #[tokio::test]
    async fn read_json_distinguishes_missing_from_malformed() {
        let storage = MemoryStorage::new();
        let missing: Option<Workspace> = read_json(&storage, "nope.json").await.unwrap();
        assert!(missing.is_none());

        storage.write_file("bad.json", "{ not json").await.unwrap();
        let err = read_json::<Workspace>(&storage, "bad.json").await.unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[tokio::test]
    async fn list_or_empty_swallows_only_not_found() {
        let storage = MemoryStorage::new();
        assert!(list_or_empty(&storage, "collections").await.unwrap().is_empty());
        storage.create_directory("collections/Orders").await.unwrap();
        assert_eq!(
            list_or_empty(&storage, "collections").await.unwrap(),
            ["Orders"]
        );
    }

    #[test]
    fn to_json_is_pretty_and_newline_terminated() {
        let json = to_json(&serde_json::json!({"name": "Orders"})).unwrap();
        assert!(json.contains("\n  \"name\""));
        assert!(json.ends_with('\n'));
    }
}
