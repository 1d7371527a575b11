//! Workspace metadata, one per opened storage root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current version of the on-disk layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Root metadata persisted at `.apiclient/workspace.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub selected_environment: Option<String>,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
            selected_environment: None,
        }
    }

    /// Bump `updated_at` after a change worth remembering across sessions.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
