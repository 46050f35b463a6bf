//! Warehouse client seam shared by the initializer and the loader.

use anyhow::Result;
use async_trait::async_trait;

/// Thin statement-execution surface over a warehouse connection.
///
/// DDL during initialization runs through [`Warehouse::execute`] with
/// autocommit semantics. Each flush runs its statement batch through
/// [`Warehouse::execute_transaction`] so a checkpoint is only reachable once
/// the whole load committed.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<()>;

    async fn execute_transaction(&self, statements: &[String]) -> Result<()>;

    /// Connectivity probe backing the `check` command.
    async fn check(&self) -> Result<()>;

    /// Releases pooled connections at the end of a session.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
