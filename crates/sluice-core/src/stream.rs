//! Binding of a configured input stream to its target tables.

use indexmap::IndexMap;

use crate::catalog::SyncMode;
use crate::table::Table;

/// One configured stream together with the tables it lands into.
///
/// Both maps are keyed by the dotted table path (`"users"`,
/// `"users.address"`, ...) in parent-before-child insertion order. Staging
/// entries exist only when the sync mode is [`SyncMode::AppendDedup`].
#[derive(Debug, Clone)]
pub struct StreamBinding {
    pub name: String,
    pub namespace: String,
    pub sync_mode: SyncMode,
    pub final_tables: IndexMap<String, Table>,
    pub staging_tables: IndexMap<String, Table>,
}

impl StreamBinding {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        sync_mode: SyncMode,
        final_tables: IndexMap<String, Table>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            sync_mode,
            final_tables,
            staging_tables: IndexMap::new(),
        }
    }

    /// Schema holding this stream's staging tables.
    pub fn staging_schema(&self) -> String {
        format!("_airbyte_{}", self.namespace)
    }
}
