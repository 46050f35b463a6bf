//! Postgres-wire warehouse client with a bounded connection pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use sluice_core::config::RedshiftConfig;
use tokio_postgres::NoTls;

use crate::warehouse::Warehouse;

/// Redshift adapter. Connections come from a deadpool sized
/// `1..=max_connections`; initialization and flush paths draw from the same
/// pool, one statement batch per checked-out connection.
pub struct RedshiftWarehouse {
    pool: Pool,
}

impl RedshiftWarehouse {
    pub fn new(config: &RedshiftConfig) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.username)
            .password(&config.password);

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .build()
            .context("build connection pool")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Warehouse for RedshiftWarehouse {
    async fn execute(&self, statement: &str) -> Result<()> {
        let client = self.pool.get().await.context("acquire connection")?;
        client.batch_execute(statement).await?;
        Ok(())
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
        let mut client = self.pool.get().await.context("acquire connection")?;
        let transaction = client.transaction().await?;
        for statement in statements {
            transaction.batch_execute(statement).await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        let client = self.pool.get().await.context("acquire connection")?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }
}
