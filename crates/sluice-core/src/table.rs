//! In-memory model of a target warehouse table and the DDL/DML it emits.

use std::path::PathBuf;

use crate::types::{DataType, Dialect, Field};
use crate::SinkError;

/// Synthetic identity column present on every table. Holds the last 32 hex
/// characters of the SHA-256 over the row's hashing keys.
pub const IDENTITY_COLUMN: &str = "_airbyte_ab_id";

/// Synthetic emission-time column present on every table.
pub const EMITTED_AT_COLUMN: &str = "_airbyte_emitted_at";

/// A finalized spool moved to a loadable location by a stage uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRef {
    /// Object-storage stage consumed by `COPY`.
    S3 {
        /// Full `s3://bucket/key` URL quoted into the load statement.
        url: String,
        /// Bucket-relative object key, used to delete the object afterwards.
        key: String,
        /// IAM role the warehouse assumes to read the object.
        iam_role: String,
    },
    /// Local-file stage consumed by `LOAD DATA LOCAL INFILE`.
    Local { path: PathBuf },
}

impl StageRef {
    pub fn location(&self) -> String {
        match self {
            StageRef::S3 { url, .. } => url.clone(),
            StageRef::Local { path } => path.display().to_string(),
        }
    }
}

/// Identifying summary of a parent table, carried by its children.
///
/// The table graph is a tree, so children keep a value copy of the two parent
/// attributes they need (reference-key naming and FK DDL) instead of a
/// back-pointer into the table registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub name: String,
    pub full_name: String,
}

/// A named, schema-qualified collection of fields, plus the keys and parent
/// reference that tie it into the table tree.
#[derive(Debug, Clone)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub dialect: Dialect,
    user_fields: Vec<Field>,
    /// Always led by [`IDENTITY_COLUMN`].
    pub primary_keys: Vec<String>,
    pub parent: Option<ParentLink>,
}

impl Table {
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        dialect: Dialect,
        primary_keys: Vec<String>,
        parent: Option<ParentLink>,
    ) -> Self {
        let mut keys = vec![IDENTITY_COLUMN.to_string()];
        keys.extend(primary_keys);
        Self {
            schema: schema.into(),
            name: name.into(),
            dialect,
            user_fields: Vec::new(),
            primary_keys: keys,
            parent,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn add_field(&mut self, field: Field) {
        self.user_fields.push(field);
    }

    /// The column referencing the parent's identity, if this table has a parent.
    pub fn reference_key(&self) -> Option<Field> {
        self.parent
            .as_ref()
            .map(|parent| Field::new(format!("_airbyte_{}_id", parent.name), DataType::identity()))
    }

    /// All columns in emission order. Redshift appends the synthetic columns
    /// after the user fields; SingleStore leads with them. Each dialect keeps
    /// its order across DDL, CSV headers, and hashing.
    pub fn fields(&self) -> Vec<Field> {
        let identity = Field::new(IDENTITY_COLUMN, DataType::identity());
        let emitted_at = Field::new(EMITTED_AT_COLUMN, self.dialect.timestamp_type());

        let mut fields = match self.dialect {
            Dialect::Redshift => {
                let mut fields = self.user_fields.clone();
                fields.push(identity);
                fields.push(emitted_at);
                fields
            }
            Dialect::Singlestore => {
                let mut fields = vec![identity, emitted_at];
                fields.extend(self.user_fields.clone());
                fields
            }
        };
        fields.extend(self.reference_key());
        fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields().into_iter().map(|field| field.name).collect()
    }

    /// Structural clone of this table in a staging schema.
    pub fn staging_peer(&self, staging_schema: &str) -> Table {
        let mut peer = self.clone();
        peer.schema = staging_schema.to_string();
        peer
    }

    /// Idempotent creation DDL. With `staging = true` the non-durable storage
    /// hints are selected (`BACKUP NO`, `AUTOSTATS_ENABLED = FALSE`).
    pub fn create_statement(&self, staging: bool) -> String {
        let columns = self
            .fields()
            .iter()
            .map(Field::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let primary_key = format!("PRIMARY KEY({})", self.primary_keys.join(", "));

        match self.dialect {
            Dialect::Redshift => {
                let foreign_key = self
                    .parent
                    .as_ref()
                    .zip(self.reference_key())
                    .map(|(parent, key)| {
                        format!(
                            ", FOREIGN KEY({}) REFERENCES {}({})",
                            key.name, parent.full_name, IDENTITY_COLUMN
                        )
                    })
                    .unwrap_or_default();
                format!(
                    "CREATE TABLE IF NOT EXISTS {full_name} (\n    {columns}, {primary_key}{foreign_key}, UNIQUE({IDENTITY_COLUMN})\n)\nBACKUP {backup}\nDISTKEY({IDENTITY_COLUMN})\nSORTKEY({EMITTED_AT_COLUMN});",
                    full_name = self.full_name(),
                    backup = if staging { "NO" } else { "YES" },
                )
            }
            Dialect::Singlestore => format!(
                "CREATE TABLE IF NOT EXISTS {full_name} (\n    {columns}, {primary_key}, SORT KEY({EMITTED_AT_COLUMN})\n)\nAUTOSTATS_ENABLED = {autostats};",
                full_name = self.full_name(),
                autostats = if staging { "FALSE" } else { "TRUE" },
            ),
        }
    }

    pub fn truncate_statement(&self) -> String {
        format!("TRUNCATE TABLE {}", self.full_name())
    }

    /// Bulk ingest of a gzipped CSV stage into this table. The stage flavor
    /// must match the dialect; a mismatch is a configuration-shaped error.
    pub fn stage_load_statement(&self, stage: &StageRef) -> Result<String, SinkError> {
        match (self.dialect, stage) {
            (Dialect::Redshift, StageRef::S3 { url, iam_role, .. }) => Ok(format!(
                "COPY {full_name}\nFROM '{url}'\niam_role '{iam_role}'\nFORMAT CSV\nTIMEFORMAT 'auto'\nACCEPTANYDATE\nTRUNCATECOLUMNS\nIGNOREHEADER 1\nGZIP",
                full_name = self.full_name(),
            )),
            (Dialect::Singlestore, StageRef::Local { path }) => Ok(format!(
                "LOAD DATA LOCAL INFILE '{path}' COMPRESSION GZIP\nINTO TABLE {full_name}\nFIELDS TERMINATED BY ','\nIGNORE 1 LINES",
                path = path.display(),
                full_name = self.full_name(),
            )),
            _ => Err(SinkError::StageMismatch {
                stage: stage.location(),
                dialect: self.dialect.name(),
            }),
        }
    }

    /// Removes all but the newest row per identity, ordering by emission time.
    pub fn deduplicate_statement(&self) -> String {
        format!(
            "WITH duplicates AS (\n    SELECT *, row_number() OVER (PARTITION BY {IDENTITY_COLUMN} ORDER BY {EMITTED_AT_COLUMN} DESC) as rn\n    FROM {full_name}\n)\nDELETE FROM {full_name} WHERE {IDENTITY_COLUMN} IN (SELECT {IDENTITY_COLUMN} FROM duplicates WHERE rn > 1)",
            full_name = self.full_name(),
        )
    }

    /// The statement batch merging a staging peer into this (final) table,
    /// executed in order within one transaction.
    pub fn upsert_statements(&self, staging: &Table) -> Vec<String> {
        match self.dialect {
            Dialect::Redshift => {
                let delete_condition = self
                    .primary_keys
                    .iter()
                    .map(|column| format!("staging.{column} = {}.{column}", self.name))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                vec![
                    format!(
                        "DELETE FROM {target}\nUSING {staging} AS staging WHERE {delete_condition}",
                        target = self.full_name(),
                        staging = staging.full_name(),
                    ),
                    format!(
                        "INSERT INTO {target}\nSELECT * FROM {staging}",
                        target = self.full_name(),
                        staging = staging.full_name(),
                    ),
                    staging.truncate_statement(),
                ]
            }
            Dialect::Singlestore => {
                let assignments = self
                    .field_names()
                    .iter()
                    .map(|column| format!("{column} = VALUES({column})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![
                    format!(
                        "INSERT INTO {target} SELECT * FROM {staging} ON DUPLICATE KEY UPDATE {assignments}",
                        target = self.full_name(),
                        staging = staging.full_name(),
                    ),
                    staging.truncate_statement(),
                ]
            }
        }
    }
}
