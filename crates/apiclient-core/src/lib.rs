//! # apiclient-core
//!
//! Core types for the API client's collection tree.
//!
//! This crate defines the foundational types used by the store and its front ends:
//! - [`Collection`], [`Folder`] and [`Request`]: the request tree
//! - [`Environment`]: named variable sets
//! - [`Workspace`]: per-root metadata
//! - [`paths`]: pure mapping from tree positions to storage paths
//! - [`TreeIndex`]: in-memory lookup by path
//! - Error hierarchy ([`ApiError`], [`StorageError`])

pub mod collection;
pub mod environment;
pub mod error;
pub mod paths;
pub mod request;
pub mod tree;
pub mod workspace;

pub use collection::{Collection, Folder, FolderMeta, Node};
pub use environment::{Environment, Variable, VariableKind};
pub use error::{ApiError, NodeKind, Result, StorageError};
pub use paths::{sanitize, NodePath};
pub use request::{
    ApiKeyLocation, Auth, HttpMethod, KeyValue, RawLanguage, Request, RequestBody, RequestPatch,
};
pub use tree::{ItemKind, TreeIndex};
pub use workspace::Workspace;
