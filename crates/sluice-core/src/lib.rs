//! # Sluice Core - Warehouse Sink Model Library
//!
//! This crate provides the foundational types for the sluice warehouse ingestion
//! sink. It models the translation from a JSON-schema-governed record stream into
//! a tree of flat, related warehouse tables, and carries the protocol and
//! configuration surfaces the connector exchanges with its host.
//!
//! ## Key Components
//!
//! - **Type Mapper**: JSON-schema leaf types resolved to warehouse column types
//! - **Table Model**: per-table DDL/DML emission for both supported dialects
//! - **Schema Flattening**: nested JSON schemas shredded into parent/child tables
//! - **Catalog & Messages**: the configured catalog and the record/state stream
//! - **Configuration**: warehouse-tagged connector configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use sluice_core::schema::SchemaFlattener;
//! use sluice_core::types::Dialect;
//! use serde_json::json;
//!
//! let schema = json!({"properties": {"id": {"type": "string"}}});
//! let tables = SchemaFlattener::new("public", "users", Dialect::Redshift, vec![])
//!     .convert(&schema);
//! assert!(tables.contains_key("users"));
//! ```

pub mod catalog;
pub mod config;
pub mod message;
pub mod schema;
pub mod stream;
pub mod table;
pub mod types;

pub use catalog::{ConfiguredCatalog, ConfiguredStream, SyncMode};
pub use config::ConnectorConfig;
pub use message::{ConnectionStatus, Message, RecordMessage, StateMessage, Status};
pub use schema::SchemaFlattener;
pub use stream::StreamBinding;
pub use table::{StageRef, Table, EMITTED_AT_COLUMN, IDENTITY_COLUMN};
pub use types::{DataType, Dialect, Field};

/// Error conditions raised by the sink outside of driver/transport failures.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The configured catalog carries a stream without a namespace. Tables are
    /// always schema-qualified, so the session cannot start.
    #[error("stream {0} has no namespace configured")]
    MissingNamespace(String),

    /// A RECORD message referenced a stream that is not in the catalog.
    #[error("record for unknown stream: {0}")]
    UnknownStream(String),

    /// A stage reference of the wrong flavor was handed to a dialect, for
    /// example a local file path to the object-storage-loading dialect.
    #[error("stage reference {stage} is not loadable by the {dialect} dialect")]
    StageMismatch { stage: String, dialect: &'static str },

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
