//! Core traits for driving a dual-engine storage system.
//!
//! This module defines the abstractions the workers are written against:
//!
//! - [`Connector`]: opens dedicated connections to the storage system
//! - [`StorageConnection`]: executes writes and opens snapshot transactions
//! - [`SnapshotTxn`]: a transaction pinned to one logical timestamp
//! - [`RowSource`]: produces serialized rows for the write path
//! - [`Dialect`]: statement text for the workload (Strategy pattern)
//!
//! # Read engines
//!
//! The storage system answers reads from one of two engines. The engine is an
//! argument of every read ([`SnapshotTxn::query_count`]) rather than a
//! property of the connection, so a read can never silently inherit the
//! engine chosen by an earlier query.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::row::Row;

/// One of the two read paths over the same logical data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadEngine {
    /// Analytical (columnar) replica, engine A.
    Replica,
    /// Primary transactional store, engine B.
    Primary,
}

impl std::fmt::Display for ReadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadEngine::Replica => write!(f, "replica"),
            ReadEngine::Primary => write!(f, "primary"),
        }
    }
}

/// A transaction whose reads all observe the snapshot taken at begin.
///
/// Dropping a transaction without calling [`commit`](SnapshotTxn::commit)
/// leaves it to the backend to roll back.
#[async_trait]
pub trait SnapshotTxn: Send {
    /// Logical start timestamp of this transaction.
    fn start_ts(&self) -> u64;

    /// Run a single-value aggregate query against the given engine.
    async fn query_count(&mut self, engine: ReadEngine, statement: &str) -> Result<i64>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll the transaction back.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A single dedicated connection to the storage system.
///
/// Connections are owned by exactly one worker and never shared.
#[async_trait]
pub trait StorageConnection: Send {
    /// Execute a statement outside of any explicit transaction.
    ///
    /// Returns the number of affected rows.
    async fn execute(&mut self, statement: &str) -> Result<u64>;

    /// Begin a transaction and record its start timestamp.
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn SnapshotTxn + 'a>>;
}

/// Boxed connection handed to workers.
pub type BoxConnection = Box<dyn StorageConnection>;

/// Factory for worker connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new dedicated connection.
    async fn connect(&self) -> Result<BoxConnection>;

    /// Short backend identifier (e.g., "tidb").
    fn backend(&self) -> &str;

    /// Statement dialect understood by this backend.
    fn dialect(&self) -> Arc<dyn Dialect>;
}

/// SQL syntax strategy for the statements the workers issue.
pub trait Dialect: Send + Sync {
    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Prefix of a multi-row insert, without the value lists.
    fn insert_prefix(&self, table: &str) -> String {
        format!("INSERT INTO {} VALUES", self.quote_ident(table))
    }

    /// Aggregate compared across both read engines.
    fn count_query(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_ident(table))
    }

    /// Delete up to `limit` rows in no particular order.
    fn delete_limit(&self, table: &str, limit: u64) -> String {
        format!("DELETE FROM {} LIMIT {}", self.quote_ident(table), limit)
    }

    /// Drop a table if it exists.
    fn drop_table_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_ident(table))
    }

    /// Create `table` with the definition of `like`.
    fn create_table_like(&self, table: &str, like: &str) -> String {
        format!(
            "CREATE TABLE {} LIKE {}",
            self.quote_ident(table),
            self.quote_ident(like)
        )
    }

    /// Request `count` analytical replicas for a table, if supported.
    fn set_replica(&self, table: &str, count: u32) -> Option<String>;

    /// Session statements run once on every verifier connection.
    fn verifier_session_setup(&self, _disable_batch_cop: bool) -> Vec<String> {
        Vec::new()
    }
}

/// Produces serialized rows on demand.
///
/// Each mutation worker owns its own source; implementations keep any RNG
/// state internally rather than in process globals.
pub trait RowSource: Send {
    /// Produce the next row.
    fn next_row(&mut self) -> Row;
}
