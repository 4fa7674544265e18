//! TiDB SQL dialect (Strategy pattern).
//!
//! TiDB speaks the MySQL protocol; on top of MySQL syntax this dialect knows
//! how to pick the read engine of a statement, read the transaction start
//! timestamp and request TiFlash replicas.

use crate::core::traits::{Dialect, ReadEngine};

/// TiDB dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct TidbDialect;

impl TidbDialect {
    /// Create a new TiDB dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Storage engine name used by `tidb_isolation_read_engines`.
    pub fn engine_name(engine: ReadEngine) -> &'static str {
        match engine {
            ReadEngine::Replica => "tiflash",
            ReadEngine::Primary => "tikv",
        }
    }

    /// Session directive restricting reads to one engine.
    pub fn read_engine_directive(&self, engine: ReadEngine) -> String {
        format!(
            "SET @@session.tidb_isolation_read_engines = '{}'",
            Self::engine_name(engine)
        )
    }

    /// Start timestamp of the current transaction.
    pub fn current_ts_query(&self) -> &'static str {
        "SELECT @@tidb_current_ts"
    }

    /// Replica availability for a table in the current database.
    pub fn replica_status_query(&self) -> &'static str {
        "SELECT REPLICA_COUNT, AVAILABLE, PROGRESS FROM information_schema.tiflash_replica \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
    }
}

impl Dialect for TidbDialect {
    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn set_replica(&self, table: &str, count: u32) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} SET TIFLASH REPLICA {}",
            self.quote_ident(table),
            count
        ))
    }

    fn verifier_session_setup(&self, disable_batch_cop: bool) -> Vec<String> {
        if disable_batch_cop {
            vec!["SET @@tidb_allow_batch_cop = 0".to_string()]
        } else {
            Vec::new()
        }
    }
}
