//! Collection-level mutations: create, rename, delete.

use tracing::info;

use apiclient_core::collection::Collection;
use apiclient_core::error::{ApiError, Result};
use apiclient_core::paths::{self, NodePath};

use crate::queue::{collection_key, WORKSPACE_KEY};
use crate::store::CollectionStore;

impl CollectionStore {
    /// Create an empty collection: descriptor plus empty `requests/` and
    /// `folders/` containers.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::DuplicateName`] or [`ApiError::KeyCollision`] if a
    /// sibling collection already claims the name or its storage key.
    pub async fn create_collection(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Collection> {
        let _turn = self
            .queue
            .enter(&[collection_key(name), WORKSPACE_KEY.to_string()])
            .await;
        let result = self.create_collection_locked(name, description).await;
        self.record(result)
    }

    async fn create_collection_locked(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Collection> {
        self.check_collection_name(name, None)?;
        self.ensure_key_free(name).await?;

        let collection = Collection::new(name, description);
        self.ensure_node_dirs(&NodePath::root(name)).await?;
        self.persist(&collection).await?;
        self.commit(collection.clone());
        self.touch_locked().await;
        info!(collection = name, "created collection");
        Ok(collection)
    }

    /// Relocate every durable file of a collection under a new storage key,
    /// then remove the old tree.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown collection, a naming
    /// error if `new_name` is taken, or the first storage failure. If only
    /// removing the old tree fails, the rename stands and the error is returned.
    pub async fn rename_collection(&self, old_name: &str, new_name: &str) -> Result<()> {
        let _turn = self
            .queue
            .enter(&[
                collection_key(old_name),
                collection_key(new_name),
                WORKSPACE_KEY.to_string(),
            ])
            .await;
        let result = self.rename_collection_locked(old_name, new_name).await;
        self.record(result)
    }

    async fn rename_collection_locked(&self, old_name: &str, new_name: &str) -> Result<()> {
        let original = self.snapshot(old_name)?;
        if old_name == new_name {
            return Ok(());
        }
        self.check_collection_name(new_name, Some(old_name))?;

        let same_key = paths::sanitize(old_name) == paths::sanitize(new_name);
        let from = NodePath::root(old_name);
        let to = NodePath::root(new_name);
        let mut renamed = original.clone();
        renamed.name = new_name.to_string();

        if !same_key {
            self.ensure_key_free(new_name).await?;
            self.ensure_node_dirs(&to).await?;
            self.write_children(Some(&from), &to, &original).await?;
        }
        self.persist(&renamed).await?;

        {
            let mut index = self.index_mut();
            index.remove(old_name);
            index.insert(renamed);
        }
        self.touch_locked().await;
        info!(from = old_name, to = new_name, "renamed collection");

        if !same_key {
            self.remove_node_dir(&from).await?;
        }
        Ok(())
    }

    /// Remove a collection from the index and delete its durable tree.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown collection. If the
    /// descriptor cannot be removed nothing changes; if only the remaining
    /// files cannot be removed the collection is gone and the error is returned.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let _turn = self
            .queue
            .enter(&[collection_key(name), WORKSPACE_KEY.to_string()])
            .await;
        let result = self.delete_collection_locked(name).await;
        self.record(result)
    }

    async fn delete_collection_locked(&self, name: &str) -> Result<()> {
        if !self.index().contains(name) {
            return Err(ApiError::NotFound(format!("collection '{name}'")));
        }
        self.storage
            .delete_file(&paths::collection_descriptor_path(name))
            .await?;
        self.index_mut().remove(name);
        self.touch_locked().await;
        info!(collection = name, "deleted collection");

        self.remove_node_dir(&NodePath::root(name)).await
    }
}
