//! # replica-parity
//!
//! Consistency harness for storage systems that serve the same data through
//! two read engines, such as TiDB with its TiKV row store and TiFlash
//! columnar replica.
//!
//! The harness runs two kinds of workers against one table:
//!
//! - **Mutation workers** insert random rows in multi-row batches, or churn
//!   the table with inserts and bounded deletes
//! - **Verification workers** open a transaction, read `COUNT(*)` from both
//!   engines at the transaction's snapshot, and compare
//!
//! Any difference at one snapshot is an engine inconsistency. It is
//! re-checked once and then stops the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use replica_parity::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> replica_parity::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let report = orchestrator.run(CancellationToken::new()).await?;
//!     println!("{} checks passed", report.stats.checks_passed);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod verify;
pub mod workload;

// Re-exports for convenient access
pub use batch::BatchAccumulator;
pub use config::{Config, MutationMode, TargetConfig, VerifyConfig, WorkloadConfig};
pub use error::{HarnessError, Result};
pub use orchestrator::{FailedWorker, Orchestrator, RunReport};
pub use verify::{ComparisonResult, ConsistencyChecker, DivergenceReport, VerificationWorker};
pub use workload::{PrepareReport, WorkerKind, WorkerStats};
