//! Snapshot-pinned comparison of the two read engines.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::core::{BoxConnection, Dialect, ReadEngine, SnapshotTxn};
use crate::error::{HarnessError, Result};

use super::types::{CheckPhase, ComparisonResult};

/// Compares one aggregate across both read engines inside one transaction.
///
/// Both reads run in the same transaction, so they observe the same start
/// timestamp; any difference between the counts is an engine inconsistency
/// rather than a concurrent write landing between the reads.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    table: String,
    query: String,
    worker: usize,
}

impl ConsistencyChecker {
    /// Checker comparing `SELECT COUNT(*)` of `table`.
    pub fn new(dialect: &dyn Dialect, table: impl Into<String>, worker: usize) -> Self {
        let table = table.into();
        Self {
            query: dialect.count_query(&table),
            table,
            worker,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The aggregate statement sent to both engines.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Run one attempt.
    ///
    /// `jitter` is slept after the snapshot is taken and before the reads.
    /// Read failures roll back and return [`HarnessError::TransientVerify`]
    /// tagged with the phase that was not reached. A mismatch is returned as
    /// `Ok` with `matched == false`; its transaction is rolled back, never
    /// committed.
    pub async fn check(&self, conn: &mut BoxConnection, jitter: Duration) -> Result<ComparisonResult> {
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| HarnessError::transient(CheckPhase::SnapshotAcquired, e))?;
        let snapshot_ts = tx.start_ts();
        debug!(worker = self.worker, tso = snapshot_ts, "snapshot acquired");

        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }

        let replica_count = match tx.query_count(ReadEngine::Replica, &self.query).await {
            Ok(count) => count,
            Err(e) => return Err(self.abort(tx, CheckPhase::ReplicaRead, e).await),
        };

        let primary_count = match tx.query_count(ReadEngine::Primary, &self.query).await {
            Ok(count) => count,
            Err(e) => return Err(self.abort(tx, CheckPhase::PrimaryRead, e).await),
        };

        let result = ComparisonResult::new(snapshot_ts, replica_count, primary_count);
        if result.matched {
            tx.commit()
                .await
                .map_err(|e| HarnessError::transient(CheckPhase::Committed, e))?;
        } else {
            error!(
                worker = self.worker,
                table = %self.table,
                tso = snapshot_ts,
                replica = replica_count,
                primary = primary_count,
                "replica and primary counts differ"
            );
            if let Err(e) = tx.rollback().await {
                warn!(worker = self.worker, "rollback after mismatch failed: {}", e);
            }
        }
        Ok(result)
    }

    async fn abort(
        &self,
        tx: Box<dyn SnapshotTxn + '_>,
        phase: CheckPhase,
        cause: HarnessError,
    ) -> HarnessError {
        if let Err(e) = tx.rollback().await {
            warn!(worker = self.worker, "rollback after {} failure failed: {}", phase, e);
        }
        HarnessError::transient(phase, cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::MockStorage;
    use crate::drivers::TidbDialect;

    fn checker() -> ConsistencyChecker {
        ConsistencyChecker::new(&TidbDialect::new(), "t", 0)
    }

    #[test]
    fn test_query_uses_dialect() {
        assert_eq!(checker().query(), "SELECT COUNT(*) FROM `t`");
    }

    #[tokio::test]
    async fn test_equal_counts_commit_once() {
        let storage = MockStorage::new().with_counts(1000, 1000);
        let mut conn = storage.connection();

        let result = checker().check(&mut conn, Duration::ZERO).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.replica_count, 1000);
        assert_eq!(result.primary_count, 1000);

        let state = storage.state();
        assert_eq!(state.commits, 1);
        assert_eq!(state.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_both_reads_share_one_snapshot_in_engine_order() {
        let storage = MockStorage::new().with_counts(5, 5);
        let mut conn = storage.connection();
        let result = checker().check(&mut conn, Duration::ZERO).await.unwrap();

        let state = storage.state();
        assert_eq!(state.begins, 1);
        assert_eq!(state.reads.len(), 2);
        assert_eq!(state.reads[0].1, ReadEngine::Replica);
        assert_eq!(state.reads[1].1, ReadEngine::Primary);
        assert_eq!(state.reads[0].0, result.snapshot_ts);
        assert_eq!(state.reads[1].0, result.snapshot_ts);
        assert_eq!(state.reads[0].2, state.reads[1].2);
    }

    #[tokio::test]
    async fn test_mismatch_is_not_committed() {
        let storage = MockStorage::new().with_counts(1000, 998);
        let mut conn = storage.connection();

        let result = checker().check(&mut conn, Duration::ZERO).await.unwrap();
        assert!(!result.matched);
        assert_eq!(result.delta(), 2);

        let state = storage.state();
        assert_eq!(state.commits, 0);
        assert_eq!(state.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_replica_read_failure_is_transient_and_rolled_back() {
        let storage = MockStorage::new().with_counts(1, 1);
        storage.state().replica_read_failures = 1;
        let mut conn = storage.connection();

        let err = checker().check(&mut conn, Duration::ZERO).await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(
            err,
            HarnessError::TransientVerify {
                phase: CheckPhase::ReplicaRead,
                ..
            }
        ));
        {
            let state = storage.state();
            assert_eq!(state.rollbacks, 1);
            assert_eq!(state.commits, 0);
        }

        // The next attempt runs at a fresh snapshot and succeeds.
        let result = checker().check(&mut conn, Duration::ZERO).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.snapshot_ts, 2);
    }

    #[tokio::test]
    async fn test_begin_failure_is_transient() {
        let storage = MockStorage::new();
        storage.state().begin_failures = 1;
        let mut conn = storage.connection();

        let err = checker().check(&mut conn, Duration::ZERO).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::TransientVerify {
                phase: CheckPhase::SnapshotAcquired,
                ..
            }
        ));
        assert!(storage.state().reads.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_sleeps_between_snapshot_and_reads() {
        let storage = MockStorage::new().with_counts(3, 3);
        let mut conn = storage.connection();

        let start = tokio::time::Instant::now();
        checker()
            .check(&mut conn, Duration::from_millis(250))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
