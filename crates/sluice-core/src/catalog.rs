//! The configured catalog handed over by the host at session start.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-stream delivery semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Insert only.
    Append,
    /// Truncate the final tables at session start, then insert.
    Overwrite,
    /// Stage, deduplicate by identity, upsert into the final tables.
    AppendDedup,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguredCatalog {
    pub streams: Vec<ConfiguredStream>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguredStream {
    pub stream: StreamDescriptor,
    /// Declared key paths, each a list of property names under the root.
    #[serde(default)]
    pub primary_key: Vec<Vec<String>>,
    pub destination_sync_mode: SyncMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub json_schema: Value,
}
