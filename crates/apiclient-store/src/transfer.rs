//! Collection export and import, as JSON or YAML documents.

use std::path::Path;

use tracing::info;

use apiclient_core::collection::{Collection, Node};
use apiclient_core::error::{ApiError, Result};
use apiclient_core::paths::{self, NodePath};
use apiclient_core::tree;

use crate::queue::{collection_key, WORKSPACE_KEY};
use crate::storage::to_json;
use crate::store::CollectionStore;

/// Serialization used for an exported collection file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick a format from a file extension; anything but `.yaml`/`.yml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }

    /// # Errors
    ///
    /// Returns [`ApiError::Serialization`] if `content` is not a valid collection.
    pub fn parse(self, content: &str) -> Result<Collection> {
        match self {
            DocumentFormat::Json => Ok(serde_json::from_str(content)?),
            DocumentFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ApiError::Serialization(e.to_string()))
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`ApiError::Serialization`] if the collection cannot be encoded.
    pub fn render(self, collection: &Collection) -> Result<String> {
        match self {
            DocumentFormat::Json => to_json(collection),
            DocumentFormat::Yaml => {
                serde_yaml::to_string(collection).map_err(|e| ApiError::Serialization(e.to_string()))
            }
        }
    }
}

impl CollectionStore {
    /// Snapshot of a loaded collection, suitable for [`DocumentFormat::render`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown collection.
    pub fn export_collection(&self, name: &str) -> Result<Collection> {
        self.snapshot(name)
    }

    /// Write a whole collection tree as a new collection. Children keep the
    /// order they have in `collection`.
    ///
    /// # Errors
    ///
    /// Returns a naming error if the collection name is taken or any node in
    /// the tree has an invalid, duplicate or colliding name; nothing is
    /// written in that case.
    pub async fn import_collection(&self, collection: Collection) -> Result<()> {
        let _turn = self
            .queue
            .enter(&[collection_key(&collection.name), WORKSPACE_KEY.to_string()])
            .await;
        let result = self.import_collection_locked(collection).await;
        self.record(result)
    }

    async fn import_collection_locked(&self, collection: Collection) -> Result<()> {
        let name = collection.name.clone();
        self.check_collection_name(&name, None)?;
        tree::validate_tree(&collection)?;
        self.ensure_key_free(&name).await?;

        let root = NodePath::root(&name);
        self.ensure_node_dirs(&root).await?;
        self.write_children(None, &root, &collection).await?;
        self.persist(&collection).await?;

        let requests = collection.request_count();
        self.commit(collection);
        self.touch_locked().await;
        info!(collection = %name, requests, key = %paths::sanitize(&name), "imported collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiclient_core::collection::Folder;
    use apiclient_core::request::{HttpMethod, Request};

    use crate::store::test_support::*;

    fn sample() -> Collection {
        let mut admin = Folder::new("Admin");
        admin
            .requests
            .push(Request::new("Cancel Order", HttpMethod::Delete, "/orders/{{id}}"));
        let mut collection = Collection::new("Orders", Some("Order API".to_string()));
        collection
            .requests
            .push(Request::new("Z last", HttpMethod::Get, "/z"));
        collection
            .requests
            .push(Request::new("A first", HttpMethod::Post, "/a"));
        collection.folders.push(admin);
        collection
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("x.yaml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("x.YML")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("x.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("x")), DocumentFormat::Json);
    }

    #[test]
    fn yaml_and_json_describe_the_same_tree() {
        let collection = sample();
        for format in [DocumentFormat::Json, DocumentFormat::Yaml] {
            let text = format.render(&collection).unwrap();
            assert_eq!(format.parse(&text).unwrap(), collection);
        }
        assert!(DocumentFormat::Yaml.parse("name: [").is_err());
    }

    #[tokio::test]
    async fn import_writes_every_document_in_source_order() {
        let (store, storage) = open_memory().await;
        store.import_collection(sample()).await.unwrap();

        assert_eq!(request_names(&store, "Orders", &[]), ["Z last", "A first"]);
        for path in [
            "collections/Orders/collection.json",
            "collections/Orders/requests/Z_last.request.json",
            "collections/Orders/requests/A_first.request.json",
            "collections/Orders/folders/Admin/folder.json",
            "collections/Orders/folders/Admin/requests/Cancel_Order.request.json",
        ] {
            assert!(storage.contains_file(path), "missing {path}");
        }
        assert_eq!(store.export_collection("Orders").unwrap(), sample());
    }

    #[tokio::test]
    async fn import_rejects_invalid_trees_without_writing() {
        let (store, storage) = open_memory().await;
        let before = storage.files();

        let mut colliding = sample();
        colliding
            .requests
            .push(Request::new("Z_last", HttpMethod::Get, "/"));
        assert!(matches!(
            store.import_collection(colliding).await.unwrap_err(),
            ApiError::KeyCollision { .. }
        ));

        let mut unnamed = sample();
        unnamed.folders[0].name = String::new();
        assert!(matches!(
            store.import_collection(unnamed).await.unwrap_err(),
            ApiError::InvalidName(_)
        ));

        assert_eq!(storage.files(), before);
        assert!(store.collection("Orders").is_none());
    }

    #[tokio::test]
    async fn import_over_existing_collection_is_rejected() {
        let (store, _storage) = open_memory().await;
        store.create_collection("Orders", None).await.unwrap();
        assert!(matches!(
            store.import_collection(sample()).await.unwrap_err(),
            ApiError::DuplicateName { .. }
        ));
        assert!(matches!(
            store.export_collection("Nope").unwrap_err(),
            ApiError::NotFound(_)
        ));
    }
}
