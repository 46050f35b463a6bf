//! Mysql-wire warehouse client serving local-infile bulk loads.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use mysql_async::prelude::{GlobalHandler, Queryable};
use mysql_async::{InfileData, LocalInfileError, OptsBuilder, Pool, TxOpts};
use sluice_core::config::SinglestoreConfig;

use crate::warehouse::Warehouse;

/// SingleStore adapter. `LOAD DATA LOCAL INFILE` is client-fed, so the
/// connection carries an infile handler that serves gzipped spools back to
/// the server; it refuses paths outside the spool directory.
pub struct SinglestoreWarehouse {
    pool: Pool,
}

struct SpoolInfileHandler;

impl GlobalHandler for SpoolInfileHandler {
    fn handle(&self, file_name: &[u8]) -> BoxFuture<'static, Result<InfileData, LocalInfileError>> {
        let path = PathBuf::from(String::from_utf8_lossy(file_name).into_owned());
        Box::pin(async move {
            if !path.starts_with(std::env::temp_dir()) {
                return Err(LocalInfileError::from(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "requested file is outside the spool directory",
                )));
            }
            let data = tokio::fs::read(&path).await?;
            Ok(InfileData::from(data))
        })
    }
}

impl SinglestoreWarehouse {
    pub fn new(config: &SinglestoreConfig) -> Self {
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .db_name(Some(config.database.clone()))
            .user(Some(config.username.clone()))
            .pass(Some(config.password.clone()))
            .local_infile_handler(Some(SpoolInfileHandler));

        Self {
            pool: Pool::new(opts),
        }
    }
}

#[async_trait]
impl Warehouse for SinglestoreWarehouse {
    async fn execute(&self, statement: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await.context("acquire connection")?;
        conn.query_drop(statement).await?;
        Ok(())
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
        let mut conn = self.pool.get_conn().await.context("acquire connection")?;
        let mut transaction = conn.start_transaction(TxOpts::default()).await?;
        for statement in statements {
            transaction.query_drop(statement).await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        let mut conn = self.pool.get_conn().await.context("acquire connection")?;
        conn.query_drop("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.clone().disconnect().await?;
        Ok(())
    }
}
