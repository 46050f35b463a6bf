//! Realizes catalog streams as warehouse tables at the start of a session.

use std::collections::HashMap;

use anyhow::Result;
use indexmap::IndexMap;
use sluice_core::types::Dialect;
use sluice_core::{ConfiguredCatalog, SchemaFlattener, SinkError, StreamBinding, SyncMode};
use tracing::info;

use crate::spool::RowSpool;
use crate::warehouse::Warehouse;

pub struct Initializer<'a> {
    catalog: &'a ConfiguredCatalog,
    warehouse: &'a dyn Warehouse,
    dialect: Dialect,
}

impl<'a> Initializer<'a> {
    pub fn new(catalog: &'a ConfiguredCatalog, warehouse: &'a dyn Warehouse, dialect: Dialect) -> Self {
        Self {
            catalog,
            warehouse,
            dialect,
        }
    }

    /// Shreds every configured stream's schema into its final table tree.
    pub fn streams(&self) -> Result<IndexMap<String, StreamBinding>> {
        let mut streams = IndexMap::new();

        for configured in &self.catalog.streams {
            let name = configured.stream.name.clone();
            let namespace = configured
                .stream
                .namespace
                .clone()
                .ok_or_else(|| SinkError::MissingNamespace(name.clone()))?;

            let primary_keys = configured
                .primary_key
                .iter()
                .map(|key_path| {
                    let mut rooted = vec![name.clone()];
                    rooted.extend(key_path.iter().cloned());
                    rooted
                })
                .collect();

            let tables = SchemaFlattener::new(namespace.clone(), name.clone(), self.dialect, primary_keys)
                .convert(&configured.stream.json_schema);
            info!(stream = %name, tables = tables.len(), "resolved stream schema");

            streams.insert(
                name.clone(),
                StreamBinding::new(name, namespace, configured.destination_sync_mode, tables),
            );
        }

        Ok(streams)
    }

    /// Creates every final table in parent-before-child order, truncating the
    /// tables of overwrite streams.
    pub async fn create_final_tables(&self, streams: &IndexMap<String, StreamBinding>) -> Result<()> {
        for stream in streams.values() {
            for table in stream.final_tables.values() {
                self.warehouse.execute(&table.create_statement(false)).await?;

                if stream.sync_mode == SyncMode::Overwrite {
                    self.warehouse.execute(&table.truncate_statement()).await?;
                }
            }
        }
        Ok(())
    }

    /// For `append_dedup` streams, creates the staging schema and a staging
    /// peer for every final table.
    pub async fn create_staging_tables(&self, streams: &mut IndexMap<String, StreamBinding>) -> Result<()> {
        for stream in streams.values_mut() {
            if stream.sync_mode != SyncMode::AppendDedup {
                continue;
            }

            let staging_schema = stream.staging_schema();
            self.warehouse
                .execute(&format!("CREATE SCHEMA IF NOT EXISTS {staging_schema}"))
                .await?;

            let StreamBinding {
                final_tables,
                staging_tables,
                ..
            } = stream;
            for (path, table) in final_tables {
                let peer = table.staging_peer(&staging_schema);
                self.warehouse.execute(&peer.create_statement(true)).await?;
                staging_tables.insert(path.clone(), peer);
            }
        }
        Ok(())
    }

    /// One spool per final table, keyed by the table's full name.
    pub fn spools(streams: &IndexMap<String, StreamBinding>) -> Result<HashMap<String, RowSpool>> {
        let mut spools = HashMap::new();
        for stream in streams.values() {
            for table in stream.final_tables.values() {
                spools.insert(table.full_name(), RowSpool::new(table)?);
            }
        }
        Ok(spools)
    }
}
