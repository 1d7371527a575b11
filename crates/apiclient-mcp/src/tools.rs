//! MCP tool definitions for API client workspaces (read-only).

use std::path::PathBuf;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use tracing::warn;

use apiclient_core::environment::VariableKind;
use apiclient_core::Node;
use apiclient_store::{CollectionStore, StoreConfig};

const MASK: &str = "********";

fn error_json(message: impl std::fmt::Display) -> String {
    serde_json::json!({ "error": message.to_string() }).to_string()
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// MCP server exposing the read-only surface of a workspace.
#[derive(Debug, Clone)]
pub struct ApiClientMcpService {
    /// Storage root of the workspace.
    pub root: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl ApiClientMcpService {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            tool_router: Self::tool_router(),
        }
    }

    /// Load the workspace fresh for each call so edits made elsewhere are seen.
    async fn open_store(&self) -> Result<CollectionStore, String> {
        CollectionStore::open_config(&StoreConfig::new(&self.root))
            .await
            .map_err(|e| {
                warn!(root = %self.root.display(), error = %e, "failed to open workspace");
                format!("Failed to open workspace: {e}")
            })
    }
}

// === Tool request types ===

/// Request to read a whole collection.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetCollectionRequest {
    /// Collection name (e.g., "Orders API")
    pub collection: String,
}

/// Request to read one saved request.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetRequestRequest {
    /// Collection name
    pub collection: String,
    /// Folder chain from the collection root (e.g., ["Admin", "Bulk"]); omit for the root
    pub folders: Option<Vec<String>>,
    /// Request name
    pub name: String,
}

#[tool_router]
impl ApiClientMcpService {
    /// List collections with their request counts.
    #[tool(description = "List all collections in the workspace with their request counts")]
    async fn apiclient_list_collections(&self) -> String {
        let store = match self.open_store().await {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        let json: Vec<serde_json::Value> = store
            .collections()
            .values()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "description": c.description,
                    "folders": c.folders.len(),
                    "requests": c.request_count(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&json).unwrap_or_else(|_| "[]".to_string())
    }

    /// Read a collection's full tree.
    #[tool(description = "Read a collection's full tree of folders and requests, in display order")]
    async fn apiclient_get_collection(
        &self,
        Parameters(req): Parameters<GetCollectionRequest>,
    ) -> String {
        let store = match self.open_store().await {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match store.collection(&req.collection) {
            Some(collection) => serde_json::to_string_pretty(&collection)
                .unwrap_or_else(|_| "{}".to_string()),
            None => error_json(format!("Collection not found: {}", req.collection)),
        }
    }

    /// Resolve a request by path.
    #[tool(
        description = "Read one saved request (method, URL, headers, params, body, auth, scripts) by collection, folder path and name"
    )]
    async fn apiclient_get_request(&self, Parameters(req): Parameters<GetRequestRequest>) -> String {
        let store = match self.open_store().await {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        let folders: Vec<&str> = req
            .folders
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        match store.get_request(&req.collection, &folders, &req.name) {
            Some(request) => {
                serde_json::to_string_pretty(&request).unwrap_or_else(|_| "{}".to_string())
            }
            None => error_json(format!(
                "Request not found: {}/{}",
                std::iter::once(req.collection.as_str())
                    .chain(folders.iter().copied())
                    .collect::<Vec<_>>()
                    .join("/"),
                req.name
            )),
        }
    }

    /// List environments with secret values masked.
    #[tool(description = "List environments and their variables; secret values are masked")]
    async fn apiclient_list_environments(&self) -> String {
        let store = match self.open_store().await {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        let selected = store.workspace().selected_environment;
        let json: Vec<serde_json::Value> = store
            .environments()
            .into_iter()
            .map(|env| {
                let variables: Vec<serde_json::Value> = env
                    .variables
                    .iter()
                    .map(|v| {
                        let value = match v.kind {
                            VariableKind::Secret => MASK,
                            VariableKind::Plain => v.value.as_str(),
                        };
                        serde_json::json!({
                            "key": v.key,
                            "value": value,
                            "type": v.kind,
                            "enabled": v.enabled,
                        })
                    })
                    .collect();
                serde_json::json!({
                    "name": env.name,
                    "selected": selected.as_deref() == Some(env.name.as_str()),
                    "variables": variables,
                })
            })
            .collect();
        serde_json::to_string_pretty(&json).unwrap_or_else(|_| "[]".to_string())
    }

    /// Workspace metadata and totals.
    #[tool(
        description = "Get workspace status: name, schema version, timestamps, selected environment and item counts"
    )]
    async fn apiclient_workspace_status(&self) -> String {
        let store = match self.open_store().await {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        let workspace = store.workspace();
        let (collections, requests) =
            store.with_index(|index| (index.len(), index.total_requests()));
        pretty(&serde_json::json!({
            "root": self.root.display().to_string(),
            "name": workspace.name,
            "version": workspace.version,
            "created_at": workspace.created_at.to_rfc3339(),
            "updated_at": workspace.updated_at.to_rfc3339(),
            "selected_environment": workspace.selected_environment,
            "collections": collections,
            "requests": requests,
            "environments": store.environments().len(),
        }))
    }
}

#[tool_handler]
impl ServerHandler for ApiClientMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "API client workspace server. List collections, read collection trees and \
                 saved requests, list environments, and check workspace status."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiclient_core::environment::Variable;
    use apiclient_core::request::{HttpMethod, Request};

    async fn seeded() -> (tempfile::TempDir, ApiClientMcpService) {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::open_config(&StoreConfig::new(dir.path()))
            .await
            .unwrap();
        store.create_collection("Orders", None).await.unwrap();
        store.create_folder("Orders", &[], "Admin").await.unwrap();
        store
            .create_request(
                "Orders",
                &["Admin"],
                Request::new("Cancel", HttpMethod::Delete, "/orders/{{id}}"),
            )
            .await
            .unwrap();
        store
            .create_environment(
                "dev",
                vec![
                    Variable::plain("base", "http://localhost"),
                    Variable::secret("token", "s3cr3t"),
                ],
            )
            .await
            .unwrap();
        let service = ApiClientMcpService::new(dir.path().to_path_buf());
        (dir, service)
    }

    #[test]
    fn mcp_service_creation() {
        let service = ApiClientMcpService::new(PathBuf::from("/tmp/test-workspace"));
        assert_eq!(service.root, PathBuf::from("/tmp/test-workspace"));
    }

    #[tokio::test]
    async fn list_and_get_reflect_storage() {
        let (_dir, service) = seeded().await;

        let list: serde_json::Value =
            serde_json::from_str(&service.apiclient_list_collections().await).unwrap();
        assert_eq!(list[0]["name"], "Orders");
        assert_eq!(list[0]["requests"], 1);

        let request: serde_json::Value = serde_json::from_str(
            &service
                .apiclient_get_request(Parameters(GetRequestRequest {
                    collection: "Orders".to_string(),
                    folders: Some(vec!["Admin".to_string()]),
                    name: "Cancel".to_string(),
                }))
                .await,
        )
        .unwrap();
        assert_eq!(request["method"], "DELETE");

        let missing: serde_json::Value = serde_json::from_str(
            &service
                .apiclient_get_collection(Parameters(GetCollectionRequest {
                    collection: "Nope".to_string(),
                }))
                .await,
        )
        .unwrap();
        assert!(missing["error"].as_str().unwrap().contains("Nope"));
    }

    #[tokio::test]
    async fn environments_mask_secrets() {
        let (_dir, service) = seeded().await;
        let envs: serde_json::Value =
            serde_json::from_str(&service.apiclient_list_environments().await).unwrap();
        assert_eq!(envs[0]["variables"][0]["value"], "http://localhost");
        assert_eq!(envs[0]["variables"][1]["value"], MASK);

        let status: serde_json::Value =
            serde_json::from_str(&service.apiclient_workspace_status().await).unwrap();
        assert_eq!(status["collections"], 1);
        assert_eq!(status["environments"], 1);
        assert_eq!(status["version"], 1);
    }
}
