//! TiDB connections over the MySQL protocol.
//!
//! Uses mysql_async. The pool is only a connection factory: every worker
//! takes one connection out of it and keeps it for its whole lifetime.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{
    Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, Transaction, TxOpts,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::traits::{
    BoxConnection, Connector, Dialect, ReadEngine, SnapshotTxn, StorageConnection,
};
use crate::error::{HarnessError, Result};

use super::dialect::TidbDialect;

/// Connection factory for a TiDB cluster.
pub struct TidbConnector {
    pool: Pool,
    dialect: Arc<TidbDialect>,
    endpoint: String,
}

impl TidbConnector {
    /// Create a connector allowing up to `max_conns` simultaneous connections.
    pub async fn new(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => None,
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => {
                Some(SslOpts::default())
            }
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', connecting without TLS",
                    config.ssl_mode
                );
                None
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
            HarnessError::Config(format!("invalid connection limit {}", max_conns))
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| HarnessError::connection(e, "creating TiDB connection pool"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| HarnessError::connection(e, "testing TiDB connection"))?;
        drop(conn);

        let endpoint = format!("{}:{}/{}", config.host, config.port, config.database);
        info!("Connected to TiDB: {}", endpoint);

        Ok(Self {
            pool,
            dialect: Arc::new(TidbDialect::new()),
            endpoint,
        })
    }

    /// Check connectivity, server version and replica status of `table`.
    pub async fn health_check(&self, table: &str) -> HealthReport {
        let start = Instant::now();
        let mut report = HealthReport {
            endpoint: self.endpoint.clone(),
            table: table.to_string(),
            ..Default::default()
        };

        let result: Result<()> = async {
            let mut conn = self.pool.get_conn().await?;
            report.version = conn.query_first::<String, _>("SELECT VERSION()").await?;
            report.connected = true;
            report.latency_ms = start.elapsed().as_millis() as u64;

            let status: Option<(i64, i64, f64)> = conn
                .exec_first(self.dialect.replica_status_query(), (table,))
                .await?;
            report.replica = status.map(|(replica_count, available, progress)| ReplicaStatus {
                replica_count,
                available: available != 0,
                progress,
            });
            Ok(())
        }
        .await;

        if let Err(e) = result {
            report.error = Some(e.to_string());
        }
        report
    }

    /// Close all connections.
    pub async fn disconnect(self) -> Result<()> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Connector for TidbConnector {
    async fn connect(&self) -> Result<BoxConnection> {
        let conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| HarnessError::connection(e, "opening worker connection"))?;
        Ok(Box::new(TidbConnection {
            conn,
            dialect: self.dialect.clone(),
        }))
    }

    fn backend(&self) -> &str {
        "tidb"
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        self.dialect.clone()
    }
}

/// A dedicated TiDB session.
pub struct TidbConnection {
    conn: Conn,
    dialect: Arc<TidbDialect>,
}

#[async_trait]
impl StorageConnection for TidbConnection {
    async fn execute(&mut self, statement: &str) -> Result<u64> {
        self.conn.query_drop(statement).await?;
        Ok(self.conn.affected_rows())
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn SnapshotTxn + 'a>> {
        let dialect = self.dialect.clone();
        let mut tx = self.conn.start_transaction(TxOpts::default()).await?;
        let start_ts: Option<u64> = tx.query_first(dialect.current_ts_query()).await?;
        let start_ts = start_ts.ok_or_else(|| {
            HarnessError::Storage("server returned no transaction start timestamp".into())
        })?;
        debug!(start_ts, "transaction started");
        Ok(Box::new(TidbTxn {
            tx,
            start_ts,
            dialect,
        }))
    }
}

/// A TiDB transaction with its start timestamp.
pub struct TidbTxn<'a> {
    tx: Transaction<'a>,
    start_ts: u64,
    dialect: Arc<TidbDialect>,
}

#[async_trait]
impl<'a> SnapshotTxn for TidbTxn<'a> {
    fn start_ts(&self) -> u64 {
        self.start_ts
    }

    async fn query_count(&mut self, engine: ReadEngine, statement: &str) -> Result<i64> {
        // Always set the engine right before the read; the directive is
        // session scoped and must not leak into the next query.
        self.tx
            .query_drop(self.dialect.read_engine_directive(engine))
            .await?;
        let count: Option<i64> = self.tx.query_first(statement).await?;
        count.ok_or_else(|| {
            HarnessError::Storage(format!("{} read returned no rows: {}", engine, statement))
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}

/// TiFlash replica state of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub replica_count: i64,
    pub available: bool,
    pub progress: f64,
}

/// Result of [`TidbConnector::health_check`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub endpoint: String,
    pub table: String,
    pub connected: bool,
    pub latency_ms: u64,
    pub version: Option<String>,
    /// `None` when the table has no replica configured.
    pub replica: Option<ReplicaStatus>,
    pub error: Option<String>,
}

impl HealthReport {
    /// Connected and the table's replica is available.
    pub fn healthy(&self) -> bool {
        self.connected
            && self.error.is_none()
            && self.replica.as_ref().map(|r| r.available).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_report_requires_available_replica() {
        let mut report = HealthReport {
            connected: true,
            ..Default::default()
        };
        assert!(!report.healthy());

        report.replica = Some(ReplicaStatus {
            replica_count: 2,
            available: false,
            progress: 0.4,
        });
        assert!(!report.healthy());

        report.replica = Some(ReplicaStatus {
            replica_count: 2,
            available: true,
            progress: 1.0,
        });
        assert!(report.healthy());

        report.error = Some("timeout".into());
        assert!(!report.healthy());
    }
}
