//! Mutation workers and the per-worker bookkeeping shared with verifiers.
//!
//! - [`InsertWorker`] bulk loads random rows through a batch accumulator.
//! - [`ChurnWorker`] alternates random-sized inserts and deletes so the table
//!   keeps changing without growing without bound.
//! - [`prepare`] bootstraps the workload table before a run.

mod churn;
mod insert;
pub mod prepare;

pub use churn::ChurnWorker;
pub use insert::InsertWorker;
pub use prepare::{prepare, PrepareReport};

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::HarnessError;

/// Role of a worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Insert,
    Churn,
    Verify,
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerKind::Insert => write!(f, "insert"),
            WorkerKind::Churn => write!(f, "churn"),
            WorkerKind::Verify => write!(f, "verify"),
        }
    }
}

/// Counters kept by a single worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub rows_inserted: u64,
    pub batches_flushed: u64,
    pub deletes_issued: u64,
    pub rows_deleted: u64,
    pub delete_failures: u64,
    pub checks_passed: u64,
    pub mismatches: u64,
    pub transient_errors: u64,
}

impl WorkerStats {
    /// Add another worker's counters into this one.
    pub fn merge(&mut self, other: &WorkerStats) {
        self.rows_inserted += other.rows_inserted;
        self.batches_flushed += other.batches_flushed;
        self.deletes_issued += other.deletes_issued;
        self.rows_deleted += other.rows_deleted;
        self.delete_failures += other.delete_failures;
        self.checks_passed += other.checks_passed;
        self.mismatches += other.mismatches;
        self.transient_errors += other.transient_errors;
    }
}

/// What a worker task hands back when it stops.
#[derive(Debug)]
pub struct WorkerReport {
    pub kind: WorkerKind,
    pub id: usize,
    pub stats: WorkerStats,
    /// Why the worker stopped, if it did not stop cleanly.
    pub error: Option<HarnessError>,
}

impl WorkerReport {
    pub fn new(kind: WorkerKind, id: usize, stats: WorkerStats, error: Option<HarnessError>) -> Self {
        Self {
            kind,
            id,
            stats,
            error,
        }
    }

    /// Report for a worker that never got started.
    pub fn failed(kind: WorkerKind, id: usize, error: HarnessError) -> Self {
        Self::new(kind, id, WorkerStats::default(), Some(error))
    }

    /// `kind-id`, used in logs and the run report.
    pub fn label(&self) -> String {
        format!("{}-{}", self.kind, self.id)
    }
}

/// Seeded RNG when `seed` is set, entropy otherwise.
pub fn worker_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Sleep for `duration` unless cancelled first. Returns false on cancellation.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
