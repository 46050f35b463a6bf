//! Flushes spools through the stager into the warehouse.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use sluice_core::{StageRef, StreamBinding, SyncMode, Table};
use tracing::info;

use crate::spool::RowSpool;
use crate::stage::Stager;
use crate::warehouse::Warehouse;

/// Drains spools into the warehouse: gzip, stage, bulk-load, and for
/// `append_dedup` streams the deduplicate/upsert chain, all committed in one
/// transaction per table before the stage is cleaned up.
pub struct Loader {
    warehouse: Arc<dyn Warehouse>,
    stager: Arc<dyn Stager>,
}

impl Loader {
    pub fn new(warehouse: Arc<dyn Warehouse>, stager: Arc<dyn Stager>) -> Self {
        Self { warehouse, stager }
    }

    /// Flushes every table of every stream, parent tables before children.
    pub async fn flush_streams(
        &self,
        streams: &IndexMap<String, StreamBinding>,
        spools: &mut HashMap<String, RowSpool>,
    ) -> Result<()> {
        for stream in streams.values() {
            for (path, final_table) in &stream.final_tables {
                let spool = spools
                    .get_mut(&final_table.full_name())
                    .with_context(|| format!("no spool allocated for table {}", final_table.full_name()))?;
                self.flush_table(spool, final_table, stream.staging_tables.get(path), stream.sync_mode)
                    .await?;
            }
        }
        Ok(())
    }

    async fn flush_table(
        &self,
        spool: &mut RowSpool,
        final_table: &Table,
        staging_table: Option<&Table>,
        mode: SyncMode,
    ) -> Result<()> {
        let Some(gzip) = spool.flush_gzipped()? else {
            return Ok(());
        };
        info!(rows = gzip.rows, table = %final_table.full_name(), "flushing spool to warehouse");

        let stage = self.stager.stage(&gzip).await?;

        // An uploaded spool is out of local hands; a local-file stage is the
        // gzip itself and lives until unstage.
        if matches!(stage, StageRef::S3 { .. }) {
            RowSpool::delete_gzip(&gzip)?;
        }

        let statements = match mode {
            // Overwrite differs from append only at initialization time, when
            // the final table is truncated.
            SyncMode::Append | SyncMode::Overwrite => {
                vec![final_table.stage_load_statement(&stage)?]
            }
            SyncMode::AppendDedup => {
                let staging = staging_table.with_context(|| {
                    format!("append_dedup table {} has no staging peer", final_table.full_name())
                })?;
                let mut statements = vec![
                    staging.stage_load_statement(&stage)?,
                    staging.deduplicate_statement(),
                ];
                statements.extend(final_table.upsert_statements(staging));
                statements
            }
        };

        self.warehouse.execute_transaction(&statements).await?;
        self.stager.unstage(&stage).await?;

        Ok(())
    }
}
