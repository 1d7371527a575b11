//! # apiclient-store
//!
//! Keeps the in-memory collection tree and a storage backend in step.
//!
//! The aggregate descriptor (`collection.json`) is the source of truth for
//! structure; per-request documents are the source of truth for content.
//! Structural operations write the destination before removing the source
//! and then reload the collection from its descriptor.
//!
//! - [`CollectionStore`]: the mutation protocol and read surface
//! - [`Storage`]: primitive durable operations, with [`FsStorage`] and [`MemoryStorage`]
//! - [`StoreConfig`]: where a workspace lives
//! - [`StorageWatcher`]: change notifications for documents edited elsewhere
//! - [`DocumentFormat`]: JSON/YAML collection export and import

mod collections;
pub mod config;
mod environments;
mod folders;
mod queue;
mod requests;
pub mod storage;
mod store;
pub mod transfer;
pub mod watcher;

pub use config::StoreConfig;
pub use storage::{FsStorage, MemoryStorage, Storage};
pub use store::CollectionStore;
pub use transfer::DocumentFormat;
pub use watcher::{StorageEvent, StorageWatcher};
