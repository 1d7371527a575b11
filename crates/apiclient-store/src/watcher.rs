//! File system watcher for reloading collections edited outside the store.
//!
//! Uses the `notify` crate for cross-platform file system events
//! (FSEvents on macOS, inotify on Linux, ReadDirectoryChanges on Windows).

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use apiclient_core::error::ApiError;
use apiclient_core::paths::{COLLECTIONS_DIR, ENVIRONMENTS_DIR};

/// Events emitted by the storage watcher. Paths are relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// A document was created or modified.
    Changed(PathBuf),
    /// A document was deleted.
    Removed(PathBuf),
}

impl StorageEvent {
    pub fn path(&self) -> &Path {
        match self {
            StorageEvent::Changed(path) | StorageEvent::Removed(path) => path,
        }
    }

    /// Storage key of the collection the document belongs to.
    pub fn collection_key(&self) -> Option<&str> {
        let mut parts = self.path().components();
        match (parts.next(), parts.next()) {
            (Some(Component::Normal(top)), Some(Component::Normal(key)))
                if top == COLLECTIONS_DIR =>
            {
                key.to_str()
            }
            _ => None,
        }
    }

    pub fn is_environment(&self) -> bool {
        self.path().starts_with(ENVIRONMENTS_DIR)
    }
}

/// Keep `.json` documents under `collections/` or `environments/`.
fn relevant(root: &Path, path: &Path) -> Option<PathBuf> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let relative = path.strip_prefix(root).ok()?;
    let top = relative.components().next()?.as_os_str().to_str()?;
    (top == COLLECTIONS_DIR || top == ENVIRONMENTS_DIR).then(|| relative.to_path_buf())
}

/// Watches a storage root for document changes and emits events.
pub struct StorageWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::Receiver<StorageEvent>,
}

impl StorageWatcher {
    /// Start watching a storage root for changes.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the watcher cannot be created.
    pub fn start(root: &Path) -> Result<Self, ApiError> {
        let (tx, rx) = mpsc::channel();
        // Events carry canonical paths on some platforms (/private/var on macOS).
        let root_owned = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let root_given = root.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                for path in &event.paths {
                    let Some(relative) =
                        relevant(&root_owned, path).or_else(|| relevant(&root_given, path))
                    else {
                        continue;
                    };
                    let storage_event = match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) => {
                            StorageEvent::Changed(relative)
                        }
                        EventKind::Remove(_) => StorageEvent::Removed(relative),
                        _ => continue,
                    };
                    let _ = tx.send(storage_event);
                }
            }
        })
        .map_err(|e| ApiError::Io(std::io::Error::other(e)))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| ApiError::Io(std::io::Error::other(e)))?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StorageEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Next event if one is already queued.
    pub fn try_recv(&self) -> Option<StorageEvent> {
        self.receiver.try_recv().ok()
    }
}
