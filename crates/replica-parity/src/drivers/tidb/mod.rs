//! TiDB driver.
//!
//! - [`TidbDialect`]: statement syntax, read engine directives, replica DDL
//! - [`TidbConnector`]: mysql_async backed connection factory
//!
//! # Connection
//!
//! TiDB is reached over the MySQL protocol:
//! ```text
//! mysql://root@127.0.0.1:4000/test
//! ```
//!
//! Replica reads go to TiFlash and primary reads to TiKV. The start timestamp
//! of a transaction is read from `@@tidb_current_ts`.

mod connection;
mod dialect;

pub use connection::{HealthReport, ReplicaStatus, TidbConnection, TidbConnector, TidbTxn};
pub use dialect::TidbDialect;
