//! The checkpointed write loop.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use sluice_core::types::Dialect;
use sluice_core::{ConfiguredCatalog, Message, SinkError, StreamBinding};
use tracing::debug;

use crate::init::Initializer;
use crate::loader::Loader;
use crate::shred;
use crate::spool::RowSpool;
use crate::stage::Stager;
use crate::warehouse::Warehouse;

/// One write session over an ordered message stream.
///
/// Records shred into spools; every STATE flushes all spools through the
/// loader and re-emits the state downstream, suppressed when its serialized
/// form equals the last emitted one. The checkpoint protocol is
/// at-least-once: a state surfaces only after the loader committed everything
/// before it.
pub struct WriteSession {
    streams: IndexMap<String, StreamBinding>,
    spools: HashMap<String, RowSpool>,
    loader: Loader,
    warehouse: Arc<dyn Warehouse>,
    last_flushed_state: Option<String>,
}

impl WriteSession {
    /// Realizes the catalog (tables, staging peers, spools) and binds the
    /// session to a warehouse and a stager.
    pub async fn start(
        catalog: &ConfiguredCatalog,
        warehouse: Arc<dyn Warehouse>,
        stager: Arc<dyn Stager>,
        dialect: Dialect,
    ) -> Result<Self> {
        let initializer = Initializer::new(catalog, warehouse.as_ref(), dialect);
        let mut streams = initializer.streams()?;
        initializer.create_final_tables(&streams).await?;
        initializer.create_staging_tables(&mut streams).await?;
        let spools = Initializer::spools(&streams)?;

        Ok(Self {
            streams,
            spools,
            loader: Loader::new(warehouse.clone(), stager),
            warehouse,
            last_flushed_state: None,
        })
    }

    /// Handles one message; returns the message to emit downstream, if any.
    pub async fn process(&mut self, message: Message) -> Result<Option<Message>> {
        match message {
            Message::Record { record } => {
                let stream = self
                    .streams
                    .get(&record.stream)
                    .ok_or_else(|| SinkError::UnknownStream(record.stream.clone()))?;
                shred::shred_record(stream, &record, &mut self.spools)?;
                Ok(None)
            }
            Message::State { state } => {
                self.loader.flush_streams(&self.streams, &mut self.spools).await?;

                let serialized = serde_json::to_string(&state)?;
                let emit = self.last_flushed_state.as_deref() != Some(serialized.as_str());
                self.last_flushed_state = Some(serialized);

                Ok(emit.then_some(Message::State { state }))
            }
            other => {
                debug!(?other, "ignoring non-record, non-state message");
                Ok(None)
            }
        }
    }

    /// Final flush at end of input, then release warehouse resources.
    pub async fn finish(mut self) -> Result<()> {
        self.loader.flush_streams(&self.streams, &mut self.spools).await?;
        self.warehouse.close().await
    }
}
