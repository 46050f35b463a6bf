//! Connector configuration, tagged by warehouse flavor.

use serde::Deserialize;

use crate::types::Dialect;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "warehouse", rename_all = "snake_case")]
pub enum ConnectorConfig {
    Redshift(RedshiftConfig),
    Singlestore(SinglestoreConfig),
}

impl ConnectorConfig {
    pub fn dialect(&self) -> Dialect {
        match self {
            ConnectorConfig::Redshift(_) => Dialect::Redshift,
            ConnectorConfig::Singlestore(_) => Dialect::Singlestore,
        }
    }
}

/// Object-storage-staged variant. Spools upload to
/// `s3://<s3_bucket_name>/<s3_bucket_path>/` and the warehouse pulls them
/// with `COPY`, assuming `iam_role_arn`.
#[derive(Debug, Clone, Deserialize)]
pub struct RedshiftConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    pub s3_bucket_name: String,
    pub s3_bucket_path: String,
    #[serde(default = "default_bucket_region")]
    pub s3_bucket_region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub iam_role_arn: String,
}

/// Local-file-staged variant. The warehouse client streams the gzipped spool
/// itself, so no object storage is involved.
#[derive(Debug, Clone, Deserialize)]
pub struct SinglestoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

fn default_max_connections() -> usize {
    4
}

fn default_bucket_region() -> String {
    "us-east-1".to_string()
}
