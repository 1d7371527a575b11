//! Request mutations and sibling reordering.

use tracing::{info, warn};

use apiclient_core::collection::{Collection, Node};
use apiclient_core::error::{NodeKind, Result};
use apiclient_core::paths::{self, NodePath};
use apiclient_core::request::{Request, RequestPatch};
use apiclient_core::tree::{self, ItemKind};

use crate::queue::collection_key;
use crate::storage::to_json;
use crate::store::{folder_not_found, request_not_found, CollectionStore};

fn node_mut<'a>(collection: &'a mut Collection, at: &NodePath) -> Result<&'a mut dyn Node> {
    tree::resolve_mut(collection, &at.folders).ok_or_else(|| folder_not_found(at))
}

impl CollectionStore {
    /// Append `request` to the node at `folders` and write its document.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`](apiclient_core::ApiError::NotFound) if the
    /// owning node does not exist, or a naming error if a sibling request
    /// claims the name or its storage key.
    pub async fn create_request(&self, collection: &str, folders: &[&str], request: Request) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self.create_request_locked(collection, folders, request).await;
        self.record(result)
    }

    async fn create_request_locked(&self, collection: &str, folders: &[&str], request: Request) -> Result<()> {
        paths::validate_name(&request.name)?;
        let at = NodePath::new(collection, folders);
        let mut updated = self.snapshot(collection)?;
        {
            let node = node_mut(&mut updated, &at)?;
            tree::check_sibling(
                tree::child_names(node, ItemKind::Request),
                &request.name,
                NodeKind::Request,
                None,
            )?;
            node.requests_mut().push(request.clone());
        }

        self.storage.create_directory(&at.requests_dir()).await?;
        self.write_request(&at, &request).await?;
        self.persist(&updated).await?;
        self.commit(updated);
        self.touch().await;
        info!(node = %at, request = %request.name, "created request");
        Ok(())
    }

    /// Merge `patch` into an existing request and rewrite its document in place.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`](apiclient_core::ApiError::NotFound) if
    /// the request does not exist, or the first storage failure.
    pub async fn update_request(
        &self,
        collection: &str,
        folders: &[&str],
        name: &str,
        patch: RequestPatch,
    ) -> Result<Request> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self.update_request_locked(collection, folders, name, patch).await;
        self.record(result)
    }

    async fn update_request_locked(
        &self,
        collection: &str,
        folders: &[&str],
        name: &str,
        patch: RequestPatch,
    ) -> Result<Request> {
        let at = NodePath::new(collection, folders);
        let mut updated = self.snapshot(collection)?;
        let request = {
            let request = node_mut(&mut updated, &at)?
                .request_mut(name)
                .ok_or_else(|| request_not_found(&at, name))?;
            request.apply(patch);
            request.clone()
        };

        self.write_request(&at, &request).await?;
        self.persist(&updated).await?;
        self.commit(updated);
        info!(node = %at, request = name, "updated request");
        Ok(request)
    }

    /// Give a request a new name. Only the name and its storage path change.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`](apiclient_core::ApiError::NotFound) if
    /// the request does not exist, or a naming error if `new_name` is taken.
    pub async fn rename_request(
        &self,
        collection: &str,
        folders: &[&str],
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self
            .rename_request_locked(collection, folders, old_name, new_name)
            .await;
        self.record(result)
    }

    async fn rename_request_locked(
        &self,
        collection: &str,
        folders: &[&str],
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        paths::validate_name(new_name)?;
        let at = NodePath::new(collection, folders);
        let mut updated = self.snapshot(collection)?;
        let renamed = {
            let node = node_mut(&mut updated, &at)?;
            if node.request(old_name).is_none() {
                return Err(request_not_found(&at, old_name));
            }
            if old_name == new_name {
                return Ok(());
            }
            tree::check_sibling(
                tree::child_names(node, ItemKind::Request),
                new_name,
                NodeKind::Request,
                Some(old_name),
            )?;
            let request = node
                .request_mut(old_name)
                .ok_or_else(|| request_not_found(&at, old_name))?;
            request.name = new_name.to_string();
            request.clone()
        };

        self.write_request(&at, &renamed).await?;
        self.persist(&updated).await?;
        let cleanup = if paths::sanitize(old_name) != paths::sanitize(new_name) {
            self.storage.delete_file(&at.request(old_name)).await
        } else {
            Ok(())
        };
        self.reload_locked(collection).await?;
        self.touch().await;
        info!(node = %at, from = old_name, to = new_name, "renamed request");
        Ok(cleanup?)
    }

    /// Remove a request from its node and delete its document.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`](apiclient_core::ApiError::NotFound) if
    /// the request does not exist. A failure removing the document is
    /// returned after the request has left the tree.
    pub async fn delete_request(&self, collection: &str, folders: &[&str], name: &str) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self.delete_request_locked(collection, folders, name).await;
        self.record(result)
    }

    async fn delete_request_locked(&self, collection: &str, folders: &[&str], name: &str) -> Result<()> {
        let at = NodePath::new(collection, folders);
        let mut updated = self.snapshot(collection)?;
        node_mut(&mut updated, &at)?
            .take_request(name)
            .ok_or_else(|| request_not_found(&at, name))?;

        self.persist(&updated).await?;
        self.commit(updated);
        self.touch().await;
        info!(node = %at, request = name, "deleted request");
        self.storage.delete_file(&at.request(name)).await?;
        Ok(())
    }

    /// Move a request to the end of another node's request list, possibly in
    /// another collection.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`](apiclient_core::ApiError::NotFound) if
    /// the request or the destination node does not exist, or a naming error
    /// if the destination already has a request with that name or key.
    pub async fn move_request(
        &self,
        from_collection: &str,
        from_folders: &[&str],
        to_collection: &str,
        to_folders: &[&str],
        name: &str,
    ) -> Result<()> {
        let from = NodePath::new(from_collection, from_folders);
        let to = NodePath::new(to_collection, to_folders);
        if from == to {
            return self.record(Ok(()));
        }
        let _turn = self
            .queue
            .enter(&[collection_key(from_collection), collection_key(to_collection)])
            .await;
        let result = self.move_request_locked(&from, &to, name).await;
        self.record(result)
    }

    async fn move_request_locked(&self, from: &NodePath, to: &NodePath, name: &str) -> Result<()> {
        let same_collection = from.collection == to.collection;
        let mut source = self.snapshot(&from.collection)?;
        let mut target = if same_collection {
            None
        } else {
            Some(self.snapshot(&to.collection)?)
        };

        let request = node_mut(&mut source, from)?
            .take_request(name)
            .ok_or_else(|| request_not_found(from, name))?;
        {
            let dest_root = match target.as_mut() {
                Some(target) => target,
                None => &mut source,
            };
            let dest = node_mut(dest_root, to)?;
            tree::check_sibling(
                tree::child_names(dest, ItemKind::Request),
                name,
                NodeKind::Request,
                None,
            )?;
            dest.requests_mut().push(request.clone());
        }

        let content = match self.storage.read_file(&from.request(name)).await? {
            Some(content) => content,
            None => to_json(&request)?,
        };
        self.storage.create_directory(&to.requests_dir()).await?;
        self.storage.write_file(&to.request(name), &content).await?;
        if let Some(target) = &target {
            self.persist(target).await?;
        }
        if let Err(e) = self.persist(&source).await {
            // The index still holds the target as it was before the move.
            if let Some(original) = self.collection(&to.collection).filter(|_| !same_collection) {
                if let Err(undo) = self.persist(&original).await {
                    warn!(collection = %to.collection, error = %undo, "could not restore descriptor after failed move");
                }
            }
            return Err(e);
        }

        let cleanup = self.storage.delete_file(&from.request(name)).await;
        self.reload_locked(&from.collection).await?;
        if !same_collection {
            self.reload_locked(&to.collection).await?;
        }
        self.touch().await;
        info!(from = %from, to = %to, request = name, "moved request");
        Ok(cleanup?)
    }

    /// Stable move of one child from `from_index` to `to_index` within a
    /// node's folder or request list.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::IndexOutOfRange`](apiclient_core::ApiError::IndexOutOfRange)
    /// if either index is past the end of the list.
    pub async fn reorder_items(
        &self,
        collection: &str,
        folders: &[&str],
        kind: ItemKind,
        from_index: usize,
        to_index: usize,
    ) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(collection)]).await;
        let result = self
            .reorder_items_locked(collection, folders, kind, from_index, to_index)
            .await;
        self.record(result)
    }

    async fn reorder_items_locked(
        &self,
        collection: &str,
        folders: &[&str],
        kind: ItemKind,
        from_index: usize,
        to_index: usize,
    ) -> Result<()> {
        let at = NodePath::new(collection, folders);
        let mut updated = self.snapshot(collection)?;
        {
            let node = node_mut(&mut updated, &at)?;
            match kind {
                ItemKind::Folder => tree::move_item(node.folders_mut(), from_index, to_index)?,
                ItemKind::Request => tree::move_item(node.requests_mut(), from_index, to_index)?,
            }
        }
        if from_index == to_index {
            return Ok(());
        }

        self.persist(&updated).await?;
        self.reload_locked(collection).await?;
        self.touch().await;
        info!(node = %at, ?kind, from_index, to_index, "reordered items");
        Ok(())
    }
}
