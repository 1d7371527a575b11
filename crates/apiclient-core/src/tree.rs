//! In-memory tree index of all loaded collections.
//!
//! Pure navigation and mutation of already-loaded data; no I/O. Keeping the
//! index in step with storage is the store's job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collection::{Collection, Node};
use crate::error::{ApiError, NodeKind, Result};
use crate::paths::sanitize;
use crate::request::Request;

/// Which child list of a node an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Request,
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "folder" => Ok(ItemKind::Folder),
            "request" => Ok(ItemKind::Request),
            other => Err(format!("expected 'folder' or 'request', got '{other}'")),
        }
    }
}

/// Map from collection name to its loaded tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeIndex {
    collections: BTreeMap<String, Collection>,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a collection wholesale, keyed by its name.
    pub fn insert(&mut self, collection: Collection) -> Option<Collection> {
        self.collections.insert(collection.name.clone(), collection)
    }

    pub fn remove(&mut self, name: &str) -> Option<Collection> {
        self.collections.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collections(&self) -> &BTreeMap<String, Collection> {
        &self.collections
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Walk the folder chain one segment at a time. A missing segment yields
    /// `None`; nothing is created.
    pub fn resolve<S: AsRef<str>>(&self, collection: &str, folders: &[S]) -> Option<&dyn Node> {
        resolve(self.collections.get(collection)?, folders)
    }

    pub fn resolve_mut<S: AsRef<str>>(
        &mut self,
        collection: &str,
        folders: &[S],
    ) -> Option<&mut dyn Node> {
        resolve_mut(self.collections.get_mut(collection)?, folders)
    }

    pub fn find_request<S: AsRef<str>>(
        &self,
        collection: &str,
        folders: &[S],
        name: &str,
    ) -> Option<&Request> {
        self.resolve(collection, folders)?.request(name)
    }

    /// Total number of requests across every loaded collection.
    pub fn total_requests(&self) -> usize {
        self.collections.values().map(|c| c.request_count()).sum()
    }
}

pub fn resolve<'a, S: AsRef<str>>(root: &'a Collection, folders: &[S]) -> Option<&'a dyn Node> {
    let mut node: &dyn Node = root;
    for segment in folders {
        node = node.folder(segment.as_ref())?;
    }
    Some(node)
}

pub fn resolve_mut<'a, S: AsRef<str>>(
    root: &'a mut Collection,
    folders: &[S],
) -> Option<&'a mut dyn Node> {
    let mut node: &mut dyn Node = root;
    for segment in folders {
        let segment = segment.as_ref();
        node = node.folders_mut().iter_mut().find(|f| f.name == segment)?;
    }
    Some(node)
}

/// Stable array move: remove the element at `from` and reinsert it at `to`.
///
/// # Errors
///
/// Returns [`ApiError::IndexOutOfRange`] if either index is past the end.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<()> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(ApiError::IndexOutOfRange { index, len });
        }
    }
    if from != to {
        let item = items.remove(from);
        items.insert(to, item);
    }
    Ok(())
}

/// Check that `name` can join a sibling list without clashing.
///
/// `exclude` names the node being renamed, which is allowed to collide with itself.
///
/// # Errors
///
/// Returns [`ApiError::DuplicateName`] if a sibling has the same name and
/// [`ApiError::KeyCollision`] if a sibling's sanitized storage key matches.
pub fn check_sibling<'a, I>(
    siblings: I,
    name: &str,
    kind: NodeKind,
    exclude: Option<&str>,
) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let key = sanitize(name);
    for existing in siblings {
        if Some(existing) == exclude {
            continue;
        }
        if existing == name {
            return Err(ApiError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
        if sanitize(existing) == key {
            return Err(ApiError::KeyCollision {
                name: name.to_string(),
                existing: existing.to_string(),
                key,
            });
        }
    }
    Ok(())
}

/// Names of a node's child folders or requests.
pub fn child_names(node: &dyn Node, kind: ItemKind) -> Vec<&str> {
    match kind {
        ItemKind::Folder => node.folders().iter().map(|f| f.name.as_str()).collect(),
        ItemKind::Request => node.requests().iter().map(|r| r.name.as_str()).collect(),
    }
}

/// Verify sibling uniqueness throughout a whole tree (used before import).
///
/// # Errors
///
/// Returns the first naming violation found, depth first.
pub fn validate_tree(node: &dyn Node) -> Result<()> {
    for kind in [ItemKind::Folder, ItemKind::Request] {
        let names = child_names(node, kind);
        let node_kind = match kind {
            ItemKind::Folder => NodeKind::Folder,
            ItemKind::Request => NodeKind::Request,
        };
        for (i, name) in names.iter().enumerate() {
            crate::paths::validate_name(name)?;
            check_sibling(names[..i].iter().copied(), name, node_kind, None)?;
        }
    }
    for folder in node.folders() {
        validate_tree(folder)?;
    }
    Ok(())
}
