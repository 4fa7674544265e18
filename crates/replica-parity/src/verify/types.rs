//! Type definitions for cross-engine consistency checks.

use serde::{Deserialize, Serialize};

/// Step of a verification attempt that failed to complete.
///
/// ```text
/// SnapshotAcquired -> ReplicaRead -> PrimaryRead -> Committed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPhase {
    /// Transaction open, start timestamp recorded.
    SnapshotAcquired,
    /// Replica (engine A) count read.
    ReplicaRead,
    /// Primary (engine B) count read.
    PrimaryRead,
    /// Counts matched and the transaction committed.
    Committed,
}

impl std::fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckPhase::SnapshotAcquired => write!(f, "snapshot-acquired"),
            CheckPhase::ReplicaRead => write!(f, "replica-read"),
            CheckPhase::PrimaryRead => write!(f, "primary-read"),
            CheckPhase::Committed => write!(f, "committed"),
        }
    }
}

/// Outcome of comparing both engines at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Start timestamp of the transaction both reads ran in.
    pub snapshot_ts: u64,
    /// Count returned by the replica engine.
    pub replica_count: i64,
    /// Count returned by the primary engine.
    pub primary_count: i64,
    /// Whether both counts are equal.
    pub matched: bool,
}

impl ComparisonResult {
    pub fn new(snapshot_ts: u64, replica_count: i64, primary_count: i64) -> Self {
        Self {
            snapshot_ts,
            replica_count,
            primary_count,
            matched: replica_count == primary_count,
        }
    }

    /// Signed difference replica - primary.
    pub fn delta(&self) -> i64 {
        self.replica_count - self.primary_count
    }
}

/// Evidence collected for a confirmed divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceReport {
    /// Verifier that observed the mismatch.
    pub worker: usize,
    /// Table under test.
    pub table: String,
    /// The first mismatching comparison.
    pub first: ComparisonResult,
    /// Re-check at a fresh snapshot. `None` if the re-check itself failed.
    pub confirmation: Option<ComparisonResult>,
}

impl DivergenceReport {
    /// Whether the re-check reproduced the mismatch.
    pub fn reproduced(&self) -> bool {
        matches!(self.confirmation, Some(c) if !c.matched)
    }
}

impl std::fmt::Display for DivergenceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Engines diverged on table {} (verifier {}): replica={} primary={} at tso {}",
            self.table,
            self.worker,
            self.first.replica_count,
            self.first.primary_count,
            self.first.snapshot_ts
        )?;
        match &self.confirmation {
            Some(c) if c.matched => write!(
                f,
                "; re-check at tso {} matched ({})",
                c.snapshot_ts, c.replica_count
            ),
            Some(c) => write!(
                f,
                "; re-check at tso {} also diverged: replica={} primary={}",
                c.snapshot_ts, c.replica_count, c.primary_count
            ),
            None => write!(f, "; re-check did not complete"),
        }
    }
}
