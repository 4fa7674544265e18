//! Storage system drivers.
//!
//! Each driver implements the [`Connector`](crate::core::Connector),
//! [`StorageConnection`](crate::core::StorageConnection) and
//! [`Dialect`](crate::core::Dialect) traits for one backend:
//!
//! - [`tidb`]: TiDB with TiFlash (replica) and TiKV (primary) read engines

pub mod tidb;

pub use tidb::{HealthReport, ReplicaStatus, TidbConnector, TidbDialect};
