//! Core abstractions shared by the workers.
//!
//! - [`traits`]: storage connection, snapshot transaction and row source traits
//! - [`row`]: serialized rows and the seeded random row generator
//!
//! Workers only talk to the storage system through these traits, so the
//! batching and verification logic can be tested against an in-memory double.

pub mod row;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use row::{ColumnKind, FnRowSource, RandomRowSource, Row, ACCOUNT_AGENT_COLUMNS};
pub use traits::{
    BoxConnection, Connector, Dialect, ReadEngine, RowSource, SnapshotTxn, StorageConnection,
};
