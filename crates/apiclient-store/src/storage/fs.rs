//! Directory-tree backend on the local filesystem.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use apiclient_core::error::StorageError;

use super::Storage;

/// Stores documents as real files below a root directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative storage path onto the filesystem, refusing anything
    /// that could escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_matches('/'));
        let mut full = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => full.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(StorageError::Backend(format!(
                        "path escapes storage root: {path}"
                    )))
                }
            }
        }
        Ok(full)
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read_file(&self, path: &str) -> Result<Option<String>, StorageError> {
        let full = self.resolve(path)?;
        match fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(path, e))?;
        }
        // Write beside the target and rename so readers never see a torn file.
        let mut staging = full.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, content)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        fs::rename(&staging, &full)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        debug!(path, bytes = content.len(), "wrote file");
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let full = self.resolve(path)?;
        let mut entries = fs::read_dir(&full)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(path, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_directory(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                debug!(path, "deleted file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(StorageError::Backend(
                "refusing to delete the storage root".to_string(),
            ));
        }
        let result = if recursive {
            fs::remove_dir_all(&full).await
        } else {
            fs::remove_dir(&full).await
        };
        match result {
            Ok(()) => {
                debug!(path, recursive, "deleted directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }
}
