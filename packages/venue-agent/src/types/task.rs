//! Extraction targets.

use serde::{Deserialize, Serialize};

/// One target site to extract records from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Provider name, also used to detect already-processed tasks
    pub name: String,

    /// Listing page the agent starts from
    #[serde(rename = "url")]
    pub seed_url: String,
}

impl Task {
    pub fn new(name: impl Into<String>, seed_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed_url: seed_url.into(),
        }
    }
}
