//! Path resolver: maps tree positions to storage paths.
//!
//! Layout under a storage root:
//! ```text
//! collections/<C>/collection.json
//! collections/<C>/requests/<R>.request.json
//! collections/<C>/folders/<F1>/folder.json
//! collections/<C>/folders/<F1>/requests/<R>.request.json
//! collections/<C>/folders/<F1>/folders/<F2>/folder.json
//! environments/<E>.env.json
//! .apiclient/workspace.json
//! ```
//! Every segment is passed through [`sanitize`]. Paths never encode sibling
//! order; that lives only in the aggregate descriptor.

use crate::error::{ApiError, Result};

pub const COLLECTIONS_DIR: &str = "collections";
pub const ENVIRONMENTS_DIR: &str = "environments";
pub const META_DIR: &str = ".apiclient";
pub const WORKSPACE_FILE: &str = ".apiclient/workspace.json";
pub const COLLECTION_DESCRIPTOR: &str = "collection.json";
pub const FOLDER_DESCRIPTOR: &str = "folder.json";
pub const REQUESTS_DIR: &str = "requests";
pub const FOLDERS_DIR: &str = "folders";
pub const REQUEST_SUFFIX: &str = ".request.json";
pub const ENVIRONMENT_SUFFIX: &str = ".env.json";

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Not injective: `"a b"` and `"a_b"` both map to `"a_b"`. The store rejects
/// a sibling whose key collides with an existing one instead of overwriting.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reject names that cannot serve as a node identity or storage key.
///
/// # Errors
///
/// Returns [`ApiError::InvalidName`] for blank names, names containing `/`,
/// and names whose storage key would be `.` or `..`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('/') {
        return Err(ApiError::InvalidName(name.to_string()));
    }
    let key = sanitize(name);
    if key == "." || key == ".." {
        return Err(ApiError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn collection_path(collection: &str) -> String {
    format!("{COLLECTIONS_DIR}/{}", sanitize(collection))
}

/// The aggregate descriptor of a collection.
pub fn collection_descriptor_path(collection: &str) -> String {
    format!("{}/{COLLECTION_DESCRIPTOR}", collection_path(collection))
}

/// Directory of the node at `folders` (the collection directory for an empty chain).
pub fn folder_path<S: AsRef<str>>(collection: &str, folders: &[S]) -> String {
    let mut path = collection_path(collection);
    for segment in folders {
        path.push('/');
        path.push_str(FOLDERS_DIR);
        path.push('/');
        path.push_str(&sanitize(segment.as_ref()));
    }
    path
}

/// Leaf descriptor of the folder at `folders`. For an empty chain this is the
/// collection's aggregate descriptor.
pub fn folder_descriptor_path<S: AsRef<str>>(collection: &str, folders: &[S]) -> String {
    if folders.is_empty() {
        return collection_descriptor_path(collection);
    }
    format!("{}/{FOLDER_DESCRIPTOR}", folder_path(collection, folders))
}

pub fn requests_dir<S: AsRef<str>>(collection: &str, folders: &[S]) -> String {
    format!("{}/{REQUESTS_DIR}", folder_path(collection, folders))
}

pub fn folders_dir<S: AsRef<str>>(collection: &str, folders: &[S]) -> String {
    format!("{}/{FOLDERS_DIR}", folder_path(collection, folders))
}

pub fn request_path<S: AsRef<str>>(collection: &str, folders: &[S], name: &str) -> String {
    format!(
        "{}/{}{REQUEST_SUFFIX}",
        requests_dir(collection, folders),
        sanitize(name)
    )
}

pub fn environment_path(environment: &str) -> String {
    format!(
        "{ENVIRONMENTS_DIR}/{}{ENVIRONMENT_SUFFIX}",
        sanitize(environment)
    )
}

/// True when `candidate` equals `ancestor` or lies below it.
///
/// Compares whole segments, so `["A"]` is not an ancestor of `["AB"]`.
pub fn is_same_or_descendant<S, T>(ancestor: &[S], candidate: &[T]) -> bool
where
    S: AsRef<str>,
    T: AsRef<str>,
{
    candidate.len() >= ancestor.len()
        && ancestor
            .iter()
            .zip(candidate)
            .all(|(a, c)| a.as_ref() == c.as_ref())
}

/// Position of a node: collection name plus ordered folder chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath {
    pub collection: String,
    pub folders: Vec<String>,
}

impl NodePath {
    pub fn new<S: AsRef<str>>(collection: &str, folders: &[S]) -> Self {
        Self {
            collection: collection.to_string(),
            folders: folders.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn root(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            folders: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut folders = self.folders.clone();
        folders.push(name.to_string());
        Self {
            collection: self.collection.clone(),
            folders,
        }
    }

    /// Parent position and own folder name; `None` at the collection root.
    pub fn split_last(&self) -> Option<(NodePath, &str)> {
        let (last, rest) = self.folders.split_last()?;
        Some((NodePath::new(&self.collection, rest), last.as_str()))
    }

    /// Same chain, different collection.
    pub fn in_collection(&self, collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            folders: self.folders.clone(),
        }
    }

    pub fn dir(&self) -> String {
        folder_path(&self.collection, &self.folders)
    }

    pub fn descriptor(&self) -> String {
        folder_descriptor_path(&self.collection, &self.folders)
    }

    pub fn requests_dir(&self) -> String {
        requests_dir(&self.collection, &self.folders)
    }

    pub fn folders_dir(&self) -> String {
        folders_dir(&self.collection, &self.folders)
    }

    pub fn request(&self, name: &str) -> String {
        request_path(&self.collection, &self.folders, name)
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.collection)?;
        for segment in &self.folders {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize("Create Order"), "Create_Order");
        assert_eq!(sanitize("v1.2-beta_x"), "v1.2-beta_x");
        assert_eq!(sanitize("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize("café"), "caf_");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn sanitize_collides_for_distinct_names() {
        assert_eq!(sanitize("a b"), sanitize("a_b"));
        assert_eq!(sanitize("a?b"), sanitize("a*b"));
    }

    #[test]
    fn durable_layout_matches_grammar() {
        assert_eq!(
            collection_descriptor_path("Orders"),
            "collections/Orders/collection.json"
        );
        assert_eq!(
            request_path::<&str>("Orders", &[], "Create Order"),
            "collections/Orders/requests/Create_Order.request.json"
        );
        assert_eq!(
            folder_descriptor_path("Orders", &["Admin"]),
            "collections/Orders/folders/Admin/folder.json"
        );
        assert_eq!(
            request_path("Orders", &["Admin", "Bulk Ops"], "Cancel"),
            "collections/Orders/folders/Admin/folders/Bulk_Ops/requests/Cancel.request.json"
        );
        assert_eq!(
            environment_path("Staging EU"),
            "environments/Staging_EU.env.json"
        );
        assert_eq!(
            folder_descriptor_path::<&str>("Orders", &[]),
            collection_descriptor_path("Orders")
        );
    }

    #[test]
    fn validate_name_rejects_unusable_names() {
        assert!(validate_name("Orders").is_ok());
        assert!(validate_name("a b").is_ok());
        for bad in ["", "   ", "a/b", ".", ".."] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn descendant_check_compares_segments() {
        assert!(is_same_or_descendant(&["A"], &["A"]));
        assert!(is_same_or_descendant(&["A"], &["A", "B"]));
        assert!(!is_same_or_descendant(&["A"], &["AB"]));
        assert!(!is_same_or_descendant(&["A", "B"], &["A"]));
        assert!(is_same_or_descendant::<&str, &str>(&[], &["X"]));
    }

    #[test]
    fn node_path_navigation() {
        let p = NodePath::new("Orders", &["Admin", "Bulk"]);
        assert_eq!(p.to_string(), "Orders/Admin/Bulk");
        let (parent, last) = p.split_last().expect("not root");
        assert_eq!(parent, NodePath::new("Orders", &["Admin"]));
        assert_eq!(last, "Bulk");
        assert!(NodePath::root("Orders").split_last().is_none());
        assert_eq!(parent.child("Other").folders, ["Admin", "Other"]);
        assert_eq!(
            p.in_collection("Archive").dir(),
            "collections/Archive/folders/Admin/folders/Bulk"
        );
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(s in ".*") {
            let once = sanitize(&s);
            prop_assert_eq!(sanitize(&once), once.clone());
        }

        #[test]
        fn sanitize_output_uses_safe_alphabet(s in ".*") {
            let key = sanitize(&s);
            prop_assert!(key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
            prop_assert_eq!(key.chars().count(), s.chars().count());
        }

        #[test]
        fn every_prefix_is_an_ancestor(
            segs in proptest::collection::vec("[a-z]{1,3}", 0..5),
            cut in 0usize..6,
        ) {
            let cut = cut.min(segs.len());
            prop_assert!(is_same_or_descendant(&segs[..cut], &segs[..]));
        }
    }
}
