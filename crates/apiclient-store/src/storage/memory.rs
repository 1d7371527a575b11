//! In-process backend, used when no directory is available and in tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use apiclient_core::error::StorageError;

use super::Storage;

#[derive(Debug, Default)]
struct MemoryTree {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    denied: Option<String>,
}

impl MemoryTree {
    fn add_ancestors(&mut self, path: &str) {
        let mut end = 0;
        while let Some(pos) = path[end..].find('/') {
            end += pos;
            self.dirs.insert(path[..end].to_string());
            end += 1;
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }

    fn check_writable(&self, path: &str) -> Result<(), StorageError> {
        match &self.denied {
            Some(prefix) if path == prefix || path.starts_with(&format!("{prefix}/")) => {
                Err(StorageError::PermissionDenied(path.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn is_below(path: &str, dir: &str) -> bool {
    dir.is_empty() || path.starts_with(&format!("{dir}/"))
}

/// Keeps every document in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tree: Mutex<MemoryTree>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All file paths, sorted.
    pub fn files(&self) -> Vec<String> {
        self.tree().files.keys().cloned().collect()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.tree().files.get(&normalize(path)).cloned()
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.tree().files.contains_key(&normalize(path))
    }

    /// Make every write or delete at or below `prefix` fail with
    /// [`StorageError::PermissionDenied`], as a revoked grant would.
    pub fn deny_writes(&self, prefix: &str) {
        self.tree().denied = Some(normalize(prefix));
    }

    pub fn allow_writes(&self) {
        self.tree().denied = None;
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read_file(&self, path: &str) -> Result<Option<String>, StorageError> {
        Ok(self.tree().files.get(&normalize(path)).cloned())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut tree = self.tree();
        tree.check_writable(&path)?;
        if tree.dirs.contains(&path) {
            return Err(StorageError::Backend(format!("{path} is a directory")));
        }
        tree.add_ancestors(&path);
        tree.files.insert(path, content.to_string());
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let path = normalize(path);
        let tree = self.tree();
        if !tree.is_dir(&path) {
            return Err(StorageError::NotFound(path));
        }
        let offset = if path.is_empty() { 0 } else { path.len() + 1 };
        let names: BTreeSet<String> = tree
            .files
            .keys()
            .chain(tree.dirs.iter())
            .filter(|p| is_below(p, &path))
            .filter_map(|p| p[offset..].split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn create_directory(&self, path: &str) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut tree = self.tree();
        if path.is_empty() {
            return Ok(());
        }
        if tree.files.contains_key(&path) {
            return Err(StorageError::Backend(format!("{path} is a file")));
        }
        tree.add_ancestors(&path);
        tree.dirs.insert(path);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut tree = self.tree();
        tree.check_writable(&path)?;
        tree.files.remove(&path);
        Ok(())
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut tree = self.tree();
        if path.is_empty() {
            return Err(StorageError::Backend(
                "refusing to delete the storage root".to_string(),
            ));
        }
        tree.check_writable(&path)?;
        if !tree.dirs.contains(&path) {
            return Ok(());
        }
        let has_children = tree
            .files
            .keys()
            .chain(tree.dirs.iter())
            .any(|p| is_below(p, &path));
        if has_children && !recursive {
            return Err(StorageError::Backend(format!("{path} is not empty")));
        }
        tree.files.retain(|p, _| !is_below(p, &path));
        tree.dirs.retain(|p| p != &path && !is_below(p, &path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_registers_parent_directories() {
        let storage = MemoryStorage::new();
        storage
            .write_file("collections/Orders/requests/A.request.json", "{}")
            .await
            .unwrap();
        assert_eq!(storage.list_children("").await.unwrap(), ["collections"]);
        assert_eq!(
            storage.list_children("collections/Orders").await.unwrap(),
            ["requests"]
        );
        assert_eq!(
            storage
                .list_children("collections/Orders/requests")
                .await
                .unwrap(),
            ["A.request.json"]
        );
    }

    #[tokio::test]
    async fn list_children_distinguishes_prefix_siblings() {
        let storage = MemoryStorage::new();
        storage.create_directory("a").await.unwrap();
        storage.write_file("ab/x.json", "").await.unwrap();
        assert!(storage.list_children("a").await.unwrap().is_empty());
        assert!(matches!(
            storage.list_children("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn recursive_delete_removes_subtree_only() {
        let storage = MemoryStorage::new();
        storage.write_file("a/b/c.json", "1").await.unwrap();
        storage.write_file("ab/c.json", "2").await.unwrap();

        assert!(storage.delete_directory("a", false).await.is_err());
        storage.delete_directory("a", true).await.unwrap();
        assert_eq!(storage.files(), ["ab/c.json"]);
        assert!(storage.list_children("a").await.is_err());
        storage.delete_directory("a", true).await.unwrap();
    }

    #[tokio::test]
    async fn denied_prefix_rejects_writes_and_deletes() {
        let storage = MemoryStorage::new();
        storage.write_file("locked/a.json", "1").await.unwrap();
        storage.deny_writes("locked");

        assert!(matches!(
            storage.write_file("locked/b.json", "2").await,
            Err(StorageError::PermissionDenied(_))
        ));
        assert!(storage.delete_file("locked/a.json").await.is_err());
        storage.write_file("open/b.json", "2").await.unwrap();

        storage.allow_writes();
        storage.delete_file("locked/a.json").await.unwrap();
        assert!(!storage.contains_file("locked/a.json"));
    }
}
