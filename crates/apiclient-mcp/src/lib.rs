//! # apiclient-mcp
//!
//! MCP (Model Context Protocol) server for an API client workspace.
//!
//! Exposes the read-only surface of the collection store as MCP tools:
//! - `apiclient_list_collections`: Collection names with request counts
//! - `apiclient_get_collection`: A whole collection tree
//! - `apiclient_get_request`: One request by collection, folder path and name
//! - `apiclient_list_environments`: Environments, secrets masked
//! - `apiclient_workspace_status`: Workspace metadata and totals

pub mod tools;

pub use tools::ApiClientMcpService;
