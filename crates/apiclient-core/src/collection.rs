//! Collection and folder types: the containers of the request tree.
//!
//! A [`Collection`] is serialized whole as the aggregate descriptor
//! (`collection.json`); a [`Folder`] has the same shape minus the
//! top-level fields. Sibling order is array order and is never sorted.

use serde::{Deserialize, Serialize};

use crate::request::Request;

/// Top-level container. Its name is also its storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub requests: Vec<Request>,
}

impl Collection {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
            folders: Vec::new(),
            requests: Vec::new(),
        }
    }
}

/// Recursive container. Identity is its full path inside the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub requests: Vec<Request>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            folders: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// The folder's own leaf document (`folder.json`).
    pub fn meta(&self) -> FolderMeta {
        FolderMeta {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Contents of a `folder.json` leaf document: metadata only, no children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Shared shape of collections and folders.
pub trait Node: Send + Sync {
    fn name(&self) -> &str;
    fn folders(&self) -> &[Folder];
    fn folders_mut(&mut self) -> &mut Vec<Folder>;
    fn requests(&self) -> &[Request];
    fn requests_mut(&mut self) -> &mut Vec<Request>;

    fn folder(&self, name: &str) -> Option<&Folder> {
        self.folders().iter().find(|f| f.name == name)
    }

    fn request(&self, name: &str) -> Option<&Request> {
        self.requests().iter().find(|r| r.name == name)
    }

    fn request_mut(&mut self, name: &str) -> Option<&mut Request> {
        self.requests_mut().iter_mut().find(|r| r.name == name)
    }

    /// Detach the named child folder, returning it.
    fn take_folder(&mut self, name: &str) -> Option<Folder> {
        let pos = self.folders().iter().position(|f| f.name == name)?;
        Some(self.folders_mut().remove(pos))
    }

    /// Detach the named request, returning it.
    fn take_request(&mut self, name: &str) -> Option<Request> {
        let pos = self.requests().iter().position(|r| r.name == name)?;
        Some(self.requests_mut().remove(pos))
    }

    /// Number of requests in this node and all of its descendants.
    fn request_count(&self) -> usize {
        self.requests().len()
            + self
                .folders()
                .iter()
                .map(|f| f.request_count())
                .sum::<usize>()
    }
}

macro_rules! impl_node {
    ($ty:ty) => {
        impl Node for $ty {
            fn name(&self) -> &str {
                &self.name
            }
            fn folders(&self) -> &[Folder] {
                &self.folders
            }
            fn folders_mut(&mut self) -> &mut Vec<Folder> {
                &mut self.folders
            }
            fn requests(&self) -> &[Request] {
                &self.requests
            }
            fn requests_mut(&mut self) -> &mut Vec<Request> {
                &mut self.requests
            }
        }
    };
}

impl_node!(Collection);
impl_node!(Folder);
