//! The collection store: tree index, reconciliation, and the read surface.
//!
//! Mutation procedures live in the sibling modules (`collections`, `folders`,
//! `requests`, `environments`, `transfer`), each as an `impl CollectionStore`
//! block. Every mutation follows the same shape:
//!
//! 1. enter the operation queue for the collections it touches;
//! 2. clone the affected collection out of the index;
//! 3. apply the change to the clone and write the affected documents,
//!    destination before source for anything that moves;
//! 4. persist the aggregate descriptor;
//! 5. commit the clone into the index, or reload it from the descriptor
//!    after structural changes.
//!
//! A failure at any step leaves the in-memory tree as it was.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use apiclient_core::collection::{Collection, Folder, Node};
use apiclient_core::environment::Environment;
use apiclient_core::error::{ApiError, NodeKind, Result};
use apiclient_core::paths::{
    self, NodePath, COLLECTIONS_DIR, COLLECTION_DESCRIPTOR, ENVIRONMENTS_DIR,
    ENVIRONMENT_SUFFIX, META_DIR, WORKSPACE_FILE,
};
use apiclient_core::request::Request;
use apiclient_core::tree::{self, TreeIndex};
use apiclient_core::workspace::Workspace;

use crate::config::StoreConfig;
use crate::queue::{collection_key, OpQueue, WORKSPACE_KEY};
use crate::storage::{list_or_empty, read_json, to_json, Storage};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// In-memory tree of every loaded collection, mirrored to a [`Storage`] backend.
pub struct CollectionStore {
    pub(crate) storage: Arc<dyn Storage>,
    index: RwLock<TreeIndex>,
    pub(crate) environments: RwLock<BTreeMap<String, Environment>>,
    pub(crate) workspace: RwLock<Workspace>,
    pub(crate) queue: OpQueue,
    last_error: Mutex<Option<String>>,
}

impl std::fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("collections", &self.collection_names())
            .field("last_error", &self.last_error())
            .finish_non_exhaustive()
    }
}

impl CollectionStore {
    /// Open the workspace on `storage`, creating its metadata on first use,
    /// and load every collection and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Storage`] if the backend cannot be read or the
    /// workspace metadata cannot be written.
    pub async fn open(storage: Arc<dyn Storage>, workspace_name: &str) -> Result<Self> {
        let workspace = match read_json::<Workspace>(storage.as_ref(), WORKSPACE_FILE).await? {
            Some(workspace) => workspace,
            None => {
                let workspace = Workspace::new(workspace_name);
                storage.create_directory(META_DIR).await?;
                storage
                    .write_file(WORKSPACE_FILE, &to_json(&workspace)?)
                    .await?;
                debug!(name = workspace_name, "created workspace metadata");
                workspace
            }
        };

        let store = Self {
            storage,
            index: RwLock::new(TreeIndex::new()),
            environments: RwLock::new(BTreeMap::new()),
            workspace: RwLock::new(workspace),
            queue: OpQueue::default(),
            last_error: Mutex::new(None),
        };
        store.reload_all().await?;
        Ok(store)
    }

    /// Open a filesystem-backed store described by `config`.
    ///
    /// # Errors
    ///
    /// See [`CollectionStore::open`].
    pub async fn open_config(config: &StoreConfig) -> Result<Self> {
        Self::open(Arc::new(config.storage()), &config.workspace_name).await
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    // === Read surface ===

    /// Look up a request by path. An empty folder chain means the collection root.
    pub fn get_request(&self, collection: &str, folders: &[&str], name: &str) -> Option<Request> {
        self.index()
            .find_request(collection, folders, name)
            .cloned()
    }

    pub fn collection(&self, name: &str) -> Option<Collection> {
        self.index().get(name).cloned()
    }

    /// Snapshot of every loaded collection, keyed by name.
    pub fn collections(&self) -> BTreeMap<String, Collection> {
        self.index().collections().clone()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.index().collections().keys().cloned().collect()
    }

    /// Run `f` against the live index without cloning it.
    pub fn with_index<R>(&self, f: impl FnOnce(&TreeIndex) -> R) -> R {
        f(&self.index())
    }

    pub fn workspace(&self) -> Workspace {
        self.workspace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All environments, sorted by name.
    pub fn environments(&self) -> Vec<Environment> {
        self.environments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn environment(&self, name: &str) -> Option<Environment> {
        self.environments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Message of the most recent failed operation; cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_error(&self) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Name of the loaded collection stored under directory `key`.
    pub fn collection_for_key(&self, key: &str) -> Option<String> {
        self.index()
            .collections()
            .keys()
            .find(|name| paths::sanitize(name) == key)
            .cloned()
    }

    // === Reconciliation ===

    /// Replace the in-memory collection with a fresh parse of its aggregate
    /// descriptor. A collection whose descriptor has disappeared is dropped
    /// from the index.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if no descriptor exists, or a storage or
    /// serialization error if it cannot be read.
    pub async fn reload_collection(&self, name: &str) -> Result<()> {
        let _turn = self.queue.enter(&[collection_key(name)]).await;
        let result = self.reload_locked(name).await;
        self.record(result)
    }

    /// Rebuild the whole index and environment list from storage.
    ///
    /// Waits for every in-flight operation to finish and holds off new ones
    /// until the rebuilt index is in place. Unreadable descriptors are logged
    /// and skipped rather than failing the load.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a top-level directory cannot be listed.
    pub async fn reload_all(&self) -> Result<()> {
        let _turn = self.queue.enter_all().await;
        let result = self.reload_all_inner().await;
        self.record(result)
    }

    /// Reload whatever lives under collection directory `key`: the matching
    /// collection if one is loaded, otherwise everything (a new directory
    /// appeared). Returns the reloaded collection's name.
    ///
    /// # Errors
    ///
    /// See [`CollectionStore::reload_collection`] and [`CollectionStore::reload_all`].
    pub async fn reload_key(&self, key: &str) -> Result<Option<String>> {
        match self.collection_for_key(key) {
            Some(name) => match self.reload_collection(&name).await {
                Ok(()) => Ok(Some(name)),
                Err(ApiError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => self.reload_all().await.map(|()| None),
        }
    }

    async fn reload_all_inner(&self) -> Result<()> {
        let mut index = TreeIndex::new();
        for key in list_or_empty(self.storage.as_ref(), COLLECTIONS_DIR).await? {
            let path = format!("{COLLECTIONS_DIR}/{key}/{COLLECTION_DESCRIPTOR}");
            match read_json::<Collection>(self.storage.as_ref(), &path).await {
                Ok(Some(collection)) if paths::sanitize(&collection.name) == key => {
                    index.insert(collection);
                }
                Ok(Some(collection)) => {
                    warn!(path, name = %collection.name, "descriptor name does not match its directory; skipping");
                }
                Ok(None) => debug!(key, "directory without collection descriptor; skipping"),
                Err(e) => warn!(path, error = %e, "unreadable collection descriptor; skipping"),
            }
        }

        let mut environments = BTreeMap::new();
        for file in list_or_empty(self.storage.as_ref(), ENVIRONMENTS_DIR).await? {
            if !file.ends_with(ENVIRONMENT_SUFFIX) {
                continue;
            }
            let path = format!("{ENVIRONMENTS_DIR}/{file}");
            match read_json::<Environment>(self.storage.as_ref(), &path).await {
                Ok(Some(env)) => {
                    environments.insert(env.name.clone(), env);
                }
                Ok(None) => {}
                Err(e) => warn!(path, error = %e, "unreadable environment; skipping"),
            }
        }

        debug!(
            collections = index.len(),
            environments = environments.len(),
            "loaded workspace"
        );
        *self.index_mut() = index;
        *self
            .environments
            .write()
            .unwrap_or_else(PoisonError::into_inner) = environments;
        Ok(())
    }

    /// Reload one collection. The caller holds the collection's queue turn.
    pub(crate) async fn reload_locked(&self, name: &str) -> Result<()> {
        let path = paths::collection_descriptor_path(name);
        match read_json::<Collection>(self.storage.as_ref(), &path).await? {
            Some(collection) => {
                debug!(collection = name, "reloaded collection");
                let mut index = self.index_mut();
                if collection.name != name {
                    index.remove(name);
                }
                index.insert(collection);
                Ok(())
            }
            None => {
                self.index_mut().remove(name);
                Err(ApiError::NotFound(format!("collection '{name}'")))
            }
        }
    }

    // === Shared helpers for mutation procedures ===

    pub(crate) fn index(&self) -> RwLockReadGuard<'_, TreeIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn index_mut(&self) -> RwLockWriteGuard<'_, TreeIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the outcome of a public operation in the observable error slot.
    pub(crate) fn record<T>(&self, result: Result<T>) -> Result<T> {
        let mut slot = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok(_) => *slot = None,
            Err(e) => {
                warn!(error = %e, "operation failed");
                *slot = Some(e.to_string());
            }
        }
        result
    }

    /// Clone a collection out of the index for modification.
    pub(crate) fn snapshot(&self, name: &str) -> Result<Collection> {
        self.collection(name)
            .ok_or_else(|| ApiError::NotFound(format!("collection '{name}'")))
    }

    pub(crate) fn commit(&self, collection: Collection) {
        self.index_mut().insert(collection);
    }

    /// Check a new collection name against the loaded siblings.
    pub(crate) fn check_collection_name(&self, name: &str, renaming: Option<&str>) -> Result<()> {
        paths::validate_name(name)?;
        let index = self.index();
        tree::check_sibling(
            index.collections().keys().map(String::as_str),
            name,
            NodeKind::Collection,
            renaming,
        )
    }

    /// Write the aggregate descriptor.
    pub(crate) async fn persist(&self, collection: &Collection) -> Result<()> {
        let path = paths::collection_descriptor_path(&collection.name);
        self.storage.write_file(&path, &to_json(collection)?).await?;
        Ok(())
    }

    pub(crate) async fn write_request(&self, at: &NodePath, request: &Request) -> Result<()> {
        self.storage
            .write_file(&at.request(&request.name), &to_json(request)?)
            .await?;
        Ok(())
    }

    /// Create a node's directory with its empty `requests/` and `folders/` containers.
    pub(crate) async fn ensure_node_dirs(&self, at: &NodePath) -> Result<()> {
        self.storage.create_directory(&at.requests_dir()).await?;
        self.storage.create_directory(&at.folders_dir()).await?;
        Ok(())
    }

    pub(crate) async fn remove_node_dir(&self, at: &NodePath) -> Result<()> {
        self.storage.delete_directory(&at.dir(), true).await?;
        Ok(())
    }

    /// Write `folder` and everything below it at `to`.
    ///
    /// Request documents are copied from `from` when given (the leaf files
    /// are authoritative for content); a missing source document, or no
    /// source at all, falls back to the in-memory request.
    pub(crate) fn write_subtree<'a>(
        &'a self,
        from: Option<&'a NodePath>,
        to: &'a NodePath,
        folder: &'a Folder,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_node_dirs(to).await?;
            self.storage
                .write_file(&to.descriptor(), &to_json(&folder.meta())?)
                .await?;
            self.write_children(from, to, folder).await
        })
    }

    /// Write a node's requests and child folders (not its own descriptor) at `to`.
    pub(crate) async fn write_children(
        &self,
        from: Option<&NodePath>,
        to: &NodePath,
        node: &dyn Node,
    ) -> Result<()> {
        for request in node.requests() {
            let copied = match from {
                Some(from) => self.storage.read_file(&from.request(&request.name)).await?,
                None => None,
            };
            let content = match copied {
                Some(content) => content,
                None => to_json(request)?,
            };
            self.storage
                .write_file(&to.request(&request.name), &content)
                .await?;
        }
        for child in node.folders() {
            let child_from = from.map(|f| f.child(&child.name));
            let child_to = to.child(&child.name);
            self.write_subtree(child_from.as_ref(), &child_to, child)
                .await?;
        }
        Ok(())
    }

    /// Refuse to create a collection over a descriptor that exists on disk
    /// but was skipped at load.
    pub(crate) async fn ensure_key_free(&self, name: &str) -> Result<()> {
        let path = paths::collection_descriptor_path(name);
        if self.storage.read_file(&path).await?.is_some() {
            return Err(ApiError::DuplicateName {
                kind: NodeKind::Collection,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Bump the workspace `updated_at` from inside a collection-keyed turn.
    pub(crate) async fn touch(&self) {
        let _turn = self.queue.enter_nested(&[WORKSPACE_KEY]).await;
        self.touch_locked().await;
    }

    /// Bump the workspace `updated_at`. The caller holds the workspace queue
    /// turn; a failure is logged, not returned, since the tree change stands.
    pub(crate) async fn touch_locked(&self) {
        if let Err(e) = self.save_workspace_locked(|_| {}).await {
            warn!(error = %e, "failed to update workspace metadata");
        }
    }

    /// Apply `change` to the workspace metadata and write it. The caller holds
    /// the workspace queue turn.
    pub(crate) async fn save_workspace_locked(
        &self,
        change: impl FnOnce(&mut Workspace),
    ) -> Result<()> {
        let mut updated = self.workspace();
        change(&mut updated);
        updated.touch();
        self.storage
            .write_file(WORKSPACE_FILE, &to_json(&updated)?)
            .await?;
        *self
            .workspace
            .write()
            .unwrap_or_else(PoisonError::into_inner) = updated;
        Ok(())
    }
}

pub(crate) fn folder_not_found(at: &NodePath) -> ApiError {
    ApiError::NotFound(format!("folder '{at}'"))
}

pub(crate) fn request_not_found(at: &NodePath, name: &str) -> ApiError {
    ApiError::NotFound(format!("request '{name}' in '{at}'"))
}
