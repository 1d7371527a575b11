//! Folder mutations: create, rename, delete, move.
//!
//! Position changes copy the whole subtree to its new location before the
//! old one is removed, then reload the collection from its descriptor.

use tracing::info;

use apiclient_core::collection::{Folder, Node};
use apiclient_core::error::{ApiError, NodeKind, Result};
use apiclient_core::paths::{self, NodePath};
use apiclient_core::tree::{self, ItemKind};

use crate::queue::collection_key;
use crate::storage::to_json;
use crate::store::{folder_not_found, CollectionStore};

fn split_folder(at: &NodePath) -> Result<(NodePath, &str)> {
    at.split_last()
        .ok_or_else(|| ApiError::Structural("the collection root is not a folder".to_string()))
}

impl CollectionStore {
    /// Append an empty folder to the node at `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the parent does not exist, or a
    /// naming error if a sibling folder claims the name or its storage key.
    pub async fn create_folder(&self, collection: &str, parent: &[&str], name: &str) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self.create_folder_locked(collection, parent, name).await;
        self.record(result)
    }

    async fn create_folder_locked(&self, collection: &str, parent: &[&str], name: &str) -> Result<()> {
        paths::validate_name(name)?;
        let parent_at = NodePath::new(collection, parent);
        let mut updated = self.snapshot(collection)?;
        let folder = Folder::new(name);
        {
            let node = tree::resolve_mut(&mut updated, parent)
                .ok_or_else(|| folder_not_found(&parent_at))?;
            tree::check_sibling(
                tree::child_names(node, ItemKind::Folder),
                name,
                NodeKind::Folder,
                None,
            )?;
            node.folders_mut().push(folder.clone());
        }

        let at = parent_at.child(name);
        self.write_subtree(None, &at, &folder).await?;
        self.persist(&updated).await?;
        self.commit(updated);
        self.touch().await;
        info!(folder = %at, "created folder");
        Ok(())
    }

    /// Give the folder at `path` a new name, keeping its position among its
    /// siblings and its whole subtree.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown folder, a naming error if
    /// `new_name` is taken, or the first storage failure. A failure to remove
    /// the old location is returned after the rename has taken effect.
    pub async fn rename_folder(&self, collection: &str, path: &[&str], new_name: &str) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self.rename_folder_locked(collection, path, new_name).await;
        self.record(result)
    }

    async fn rename_folder_locked(&self, collection: &str, path: &[&str], new_name: &str) -> Result<()> {
        paths::validate_name(new_name)?;
        let at = NodePath::new(collection, path);
        let (parent_at, old_name) = split_folder(&at)?;
        let mut updated = self.snapshot(collection)?;

        let renamed = {
            let parent = tree::resolve_mut(&mut updated, &parent_at.folders)
                .ok_or_else(|| folder_not_found(&at))?;
            let pos = parent
                .folders()
                .iter()
                .position(|f| f.name == old_name)
                .ok_or_else(|| folder_not_found(&at))?;
            if old_name == new_name {
                return Ok(());
            }
            tree::check_sibling(
                tree::child_names(parent, ItemKind::Folder),
                new_name,
                NodeKind::Folder,
                Some(old_name),
            )?;
            let folder = &mut parent.folders_mut()[pos];
            folder.name = new_name.to_string();
            folder.clone()
        };

        let to = parent_at.child(new_name);
        let moved = paths::sanitize(old_name) != paths::sanitize(new_name);
        if moved {
            self.write_subtree(Some(&at), &to, &renamed).await?;
        } else {
            self.storage
                .write_file(&to.descriptor(), &to_json(&renamed.meta())?)
                .await?;
        }
        self.persist(&updated).await?;

        let cleanup = if moved {
            self.remove_node_dir(&at).await
        } else {
            Ok(())
        };
        self.reload_locked(collection).await?;
        self.touch().await;
        info!(from = %at, to = %to, "renamed folder");
        cleanup
    }

    /// Detach the folder at `path` and delete its durable subtree.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown folder. If the descriptor
    /// cannot be written nothing changes; a failure removing the files is
    /// returned after the folder has left the tree.
    pub async fn delete_folder(&self, collection: &str, path: &[&str]) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self.delete_folder_locked(collection, path).await;
        self.record(result)
    }

    async fn delete_folder_locked(&self, collection: &str, path: &[&str]) -> Result<()> {
        let at = NodePath::new(collection, path);
        let (parent_at, name) = split_folder(&at)?;
        let mut updated = self.snapshot(collection)?;
        tree::resolve_mut(&mut updated, &parent_at.folders)
            .and_then(|parent| parent.take_folder(name))
            .ok_or_else(|| folder_not_found(&at))?;

        self.persist(&updated).await?;
        self.commit(updated);
        self.touch().await;
        info!(folder = %at, "deleted folder");
        self.remove_node_dir(&at).await
    }

    /// Move the folder at `from` (with its subtree) to the end of the child
    /// folders of `to_parent`, within the same collection.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Structural`] before any I/O if `to_parent` is the
    /// folder itself or one of its descendants; [`ApiError::NotFound`] if
    /// either end does not exist; a naming error if the destination already
    /// has a folder with that name or storage key.
    pub async fn move_folder(&self, collection: &str, from: &[&str], to_parent: &[&str]) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self.move_folder_locked(collection, from, to_parent).await;
        self.record(result)
    }

    async fn move_folder_locked(&self, collection: &str, from: &[&str], to_parent: &[&str]) -> Result<()> {
        let at = NodePath::new(collection, from);
        let (parent_at, name) = split_folder(&at)?;
        if paths::is_same_or_descendant(from, to_parent) {
            return Err(ApiError::Structural(format!(
                "cannot move folder '{at}' into itself or one of its descendants"
            )));
        }

        let dest_at = NodePath::new(collection, to_parent);
        let mut updated = self.snapshot(collection)?;
        if tree::resolve(&updated, from).is_none() {
            return Err(folder_not_found(&at));
        }
        let dest = tree::resolve(&updated, to_parent).ok_or_else(|| folder_not_found(&dest_at))?;
        if parent_at == dest_at {
            return Ok(());
        }
        tree::check_sibling(
            tree::child_names(dest, ItemKind::Folder),
            name,
            NodeKind::Folder,
            None,
        )?;

        let folder = tree::resolve_mut(&mut updated, &parent_at.folders)
            .and_then(|parent| parent.take_folder(name))
            .ok_or_else(|| folder_not_found(&at))?;
        tree::resolve_mut(&mut updated, to_parent)
            .ok_or_else(|| folder_not_found(&dest_at))?
            .folders_mut()
            .push(folder.clone());

        let to = dest_at.child(name);
        self.write_subtree(Some(&at), &to, &folder).await?;
        self.persist(&updated).await?;
        let cleanup = self.remove_node_dir(&at).await;
        self.reload_locked(collection).await?;
        self.touch().await;
        info!(from = %at, to = %to, "moved folder");
        cleanup
    }
}

#[cfg(test)]
mod tests {
    use apiclient_core::error::ApiError;
    use apiclient_core::request::HttpMethod;

    use crate::store::test_support::*;
    use crate::store::CollectionStore;

    async fn admin_tree() -> (CollectionStore, std::sync::Arc<crate::storage::MemoryStorage>) {
        let (store, storage) = open_memory().await;
        store.create_collection("Orders", None).await.unwrap();
        store.create_folder("Orders", &[], "Admin").await.unwrap();
        store.create_folder("Orders", &["Admin"], "Bulk").await.unwrap();
        store
            .create_request("Orders", &["Admin"], req("Cancel", HttpMethod::Delete, "/orders/1"))
            .await
            .unwrap();
        store
            .create_request("Orders", &["Admin", "Bulk"], req("Purge", HttpMethod::Delete, "/orders"))
            .await
            .unwrap();
        store.create_folder("Orders", &[], "Public").await.unwrap();
        (store, storage)
    }

    #[tokio::test]
    async fn create_writes_leaf_descriptor_and_appends() {
        let (store, storage) = admin_tree().await;
        assert_eq!(folder_names(&store, "Orders", &[]), ["Admin", "Public"]);
        let meta = storage
            .file("collections/Orders/folders/Public/folder.json")
            .unwrap();
        assert!(meta.contains("\"name\": \"Public\""));
        assert!(!meta.contains("requests"));
        assert!(storage
            .file("collections/Orders/collection.json")
            .unwrap()
            .contains("\"Public\""));
    }

    #[tokio::test]
    async fn create_rejects_missing_parent_and_duplicates() {
        let (store, _storage) = admin_tree().await;
        assert!(matches!(
            store.create_folder("Orders", &["Nope"], "X").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            store.create_folder("Orders", &[], "Admin").await.unwrap_err(),
            ApiError::DuplicateName { .. }
        ));
        assert!(matches!(
            store.create_folder("Missing", &[], "X").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn rename_copies_nested_subtree_and_keeps_position() {
        let (store, storage) = admin_tree().await;
        store.rename_folder("Orders", &["Admin"], "Back Office").await.unwrap();

        assert_eq!(folder_names(&store, "Orders", &[]), ["Back Office", "Public"]);
        assert!(storage
            .files()
            .iter()
            .all(|f| !f.starts_with("collections/Orders/folders/Admin/")));
        for path in [
            "collections/Orders/folders/Back_Office/folder.json",
            "collections/Orders/folders/Back_Office/requests/Cancel.request.json",
            "collections/Orders/folders/Back_Office/folders/Bulk/folder.json",
            "collections/Orders/folders/Back_Office/folders/Bulk/requests/Purge.request.json",
        ] {
            assert!(storage.contains_file(path), "missing {path}");
        }
        assert!(store
            .get_request("Orders", &["Back Office", "Bulk"], "Purge")
            .is_some());
    }

    #[tokio::test]
    async fn rename_rejects_sibling_clash() {
        let (store, _storage) = admin_tree().await;
        let before = store.collections();
        assert!(matches!(
            store.rename_folder("Orders", &["Admin"], "Public").await.unwrap_err(),
            ApiError::DuplicateName { .. }
        ));
        assert_eq!(store.collections(), before);
        store.rename_folder("Orders", &["Admin"], "Admin").await.unwrap();
        assert_eq!(store.collections(), before);
    }

    #[tokio::test]
    async fn delete_removes_subtree_from_tree_and_storage() {
        let (store, storage) = admin_tree().await;
        store.delete_folder("Orders", &["Admin"]).await.unwrap();
        assert_eq!(folder_names(&store, "Orders", &[]), ["Public"]);
        assert!(storage
            .files()
            .iter()
            .all(|f| !f.contains("/folders/Admin")));
        assert!(matches!(
            store.delete_folder("Orders", &["Admin"]).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn move_into_self_or_descendant_is_rejected_without_io() {
        let (store, storage) = admin_tree().await;
        let before_tree = store.collections();
        let before_files = storage.files();

        for target in [&["Admin"][..], &["Admin", "Bulk"][..]] {
            let err = store.move_folder("Orders", &["Admin"], target).await.unwrap_err();
            assert!(matches!(err, ApiError::Structural(_)), "{target:?}");
        }
        assert_eq!(store.collections(), before_tree);
        assert_eq!(storage.files(), before_files);
        assert!(store.last_error().is_some());
    }

    #[tokio::test]
    async fn move_relocates_subtree_under_new_parent() {
        let (store, storage) = admin_tree().await;
        store.move_folder("Orders", &["Admin", "Bulk"], &["Public"]).await.unwrap();

        assert!(folder_names(&store, "Orders", &["Admin"]).is_empty());
        assert_eq!(folder_names(&store, "Orders", &["Public"]), ["Bulk"]);
        assert!(storage.contains_file(
            "collections/Orders/folders/Public/folders/Bulk/requests/Purge.request.json"
        ));
        assert!(!storage.contains_file(
            "collections/Orders/folders/Admin/folders/Bulk/requests/Purge.request.json"
        ));
        assert_eq!(store.with_index(|i| i.total_requests()), 2);
    }

    #[tokio::test]
    async fn move_to_root_and_to_current_parent() {
        let (store, storage) = admin_tree().await;
        let before = storage.files();
        store.move_folder("Orders", &["Admin", "Bulk"], &["Admin"]).await.unwrap();
        assert_eq!(storage.files(), before);

        store.move_folder("Orders", &["Admin", "Bulk"], &[]).await.unwrap();
        assert_eq!(folder_names(&store, "Orders", &[]), ["Admin", "Public", "Bulk"]);
    }

    #[tokio::test]
    async fn segment_prefix_is_not_ancestry() {
        let (store, _storage) = open_memory().await;
        store.create_collection("C", None).await.unwrap();
        store.create_folder("C", &[], "A").await.unwrap();
        store.create_folder("C", &[], "AB").await.unwrap();
        store.move_folder("C", &["A"], &["AB"]).await.unwrap();
        assert_eq!(folder_names(&store, "C", &["AB"]), ["A"]);
    }

    #[tokio::test]
    async fn move_failure_at_destination_leaves_tree_and_source() {
        let (store, storage) = admin_tree().await;
        let before = store.collections();
        storage.deny_writes("collections/Orders/folders/Public");

        let err = store.move_folder("Orders", &["Admin"], &["Public"]).await.unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)), "{err:?}");
        assert_eq!(store.collections(), before);
        assert!(storage.contains_file("collections/Orders/folders/Admin/requests/Cancel.request.json"));
        assert!(storage.contains_file(
            "collections/Orders/folders/Admin/folders/Bulk/requests/Purge.request.json"
        ));
        assert!(store.get_request("Orders", &["Admin", "Bulk"], "Purge").is_some());
        assert!(store.last_error().is_some());

        storage.allow_writes();
        store.move_folder("Orders", &["Admin"], &["Public"]).await.unwrap();
        assert_eq!(folder_names(&store, "Orders", &["Public"]), ["Admin"]);
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn move_failure_on_descriptor_leaves_tree_and_source() {
        let (store, storage) = admin_tree().await;
        let before = store.collections();
        storage.deny_writes("collections/Orders/collection.json");

        assert!(store.move_folder("Orders", &["Admin", "Bulk"], &["Public"]).await.is_err());
        assert_eq!(store.collections(), before);
        assert!(storage.contains_file(
            "collections/Orders/folders/Admin/folders/Bulk/requests/Purge.request.json"
        ));
        assert!(store.get_request("Orders", &["Admin", "Bulk"], "Purge").is_some());
    }

    #[tokio::test]
    async fn rename_failure_leaves_tree_and_source() {
        let (store, storage) = admin_tree().await;
        let before = store.collections();

        for denied in ["collections/Orders/folders/Ops", "collections/Orders/collection.json"] {
            storage.deny_writes(denied);
            assert!(
                store.rename_folder("Orders", &["Admin"], "Ops").await.is_err(),
                "{denied}"
            );
            storage.allow_writes();

            assert_eq!(store.collections(), before, "{denied}");
            assert!(storage.contains_file("collections/Orders/folders/Admin/folder.json"));
            assert!(storage.contains_file(
                "collections/Orders/folders/Admin/requests/Cancel.request.json"
            ));
            assert!(store.get_request("Orders", &["Admin"], "Cancel").is_some());
        }
    }

    #[tokio::test]
    async fn folder_changes_touch_workspace() {
        let (store, storage) = admin_tree().await;
        let before = store.workspace().updated_at;
        let before_file = storage.file(apiclient_core::paths::WORKSPACE_FILE).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        store.move_folder("Orders", &["Admin", "Bulk"], &["Public"]).await.unwrap();
        assert!(store.workspace().updated_at > before);
        assert_ne!(storage.file(apiclient_core::paths::WORKSPACE_FILE).unwrap(), before_file);
    }
}
