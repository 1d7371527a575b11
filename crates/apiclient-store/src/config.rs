//! Store configuration: where the workspace lives and what it is called.

use std::path::{Path, PathBuf};

use crate::storage::FsStorage;

/// Environment variable naming the storage root.
pub const ROOT_ENV: &str = "APICLIENT_ROOT";

/// Environment variable naming the workspace created on first open.
pub const WORKSPACE_ENV: &str = "APICLIENT_WORKSPACE";

const DEFAULT_WORKSPACE_NAME: &str = "workspace";

/// Settings for opening a filesystem-backed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding `collections/`, `environments/` and `.apiclient/`.
    pub root: PathBuf,
    /// Name recorded in `workspace.json` when the workspace is first created.
    pub workspace_name: String,
}

impl StoreConfig {
    /// Config rooted at `root`, named after the root's final component.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let workspace_name = default_name(&root);
        Self {
            root,
            workspace_name,
        }
    }

    /// Read `APICLIENT_ROOT` and `APICLIENT_WORKSPACE`, defaulting to the
    /// current directory.
    pub fn from_env() -> Self {
        let root = std::env::var_os(ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let config = Self::new(root);
        match std::env::var(WORKSPACE_ENV) {
            Ok(name) if !name.trim().is_empty() => config.with_workspace_name(name),
            _ => config,
        }
    }

    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let keep_name = self.workspace_name != default_name(&self.root);
        let workspace_name = if keep_name {
            self.workspace_name
        } else {
            default_name(&root)
        };
        Self {
            root,
            workspace_name,
        }
    }

    pub fn with_workspace_name(mut self, name: impl Into<String>) -> Self {
        self.workspace_name = name.into();
        self
    }

    pub fn storage(&self) -> FsStorage {
        FsStorage::new(&self.root)
    }
}

fn default_name(root: &Path) -> String {
    root.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_WORKSPACE_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_name_defaults_to_root_dir_name() {
        assert_eq!(StoreConfig::new("/home/me/billing-api").workspace_name, "billing-api");
        assert_eq!(StoreConfig::new(".").workspace_name, "workspace");
    }

    #[test]
    fn with_root_keeps_explicit_name() {
        let cfg = StoreConfig::new("a").with_root("b");
        assert_eq!(cfg.workspace_name, "b");

        let cfg = StoreConfig::new("a").with_workspace_name("Mine").with_root("b");
        assert_eq!(cfg.workspace_name, "Mine");
        assert_eq!(cfg.root, PathBuf::from("b"));
    }
}
