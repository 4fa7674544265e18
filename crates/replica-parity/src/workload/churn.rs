//! Insert/delete churn worker.
//!
//! Every cycle inserts a random number of rows, writes them, then deletes a
//! random number of rows. With equal upper bounds the table size drifts
//! around its starting point while both engines keep seeing new versions.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::BatchAccumulator;
use crate::config::ChurnConfig;
use crate::core::{Dialect, RowSource};
use crate::error::Result;

use super::{pause, WorkerKind, WorkerReport, WorkerStats};

/// Mutation worker alternating inserts and bounded deletes.
pub struct ChurnWorker {
    id: usize,
    table: String,
    accumulator: BatchAccumulator,
    source: Box<dyn RowSource>,
    dialect: Arc<dyn Dialect>,
    config: ChurnConfig,
    rng: StdRng,
    stats: WorkerStats,
}

impl ChurnWorker {
    pub fn new(
        id: usize,
        table: impl Into<String>,
        accumulator: BatchAccumulator,
        source: Box<dyn RowSource>,
        dialect: Arc<dyn Dialect>,
        config: ChurnConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            table: table.into(),
            accumulator,
            source,
            dialect,
            config,
            rng,
            stats: WorkerStats::default(),
        }
    }

    /// Draw the insert and delete counts of the next cycle, each uniform in
    /// `0..=max`.
    pub fn plan_cycle(&mut self) -> (u64, u64) {
        let insert_num = self.rng.gen_range(0..=self.config.max_insert);
        let delete_num = self.rng.gen_range(0..=self.config.max_delete);
        (insert_num, delete_num)
    }

    /// Run one cycle with the given counts.
    ///
    /// Inserted rows are flushed before the delete runs. A failed batch is
    /// returned as a fatal error; a failed delete is logged and followed by
    /// the configured backoff.
    pub async fn run_cycle(
        &mut self,
        insert_num: u64,
        delete_num: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for _ in 0..insert_num {
            let row = self.source.next_row();
            self.accumulator.insert_value(&row).await?;
        }
        self.accumulator.flush().await?;
        self.sync_write_stats();

        if delete_num == 0 {
            return Ok(());
        }

        let statement = self.dialect.delete_limit(&self.table, delete_num);
        match self.accumulator.connection_mut().execute(&statement).await {
            Ok(deleted) => {
                self.stats.deletes_issued += 1;
                self.stats.rows_deleted += deleted;
                debug!(worker = self.id, requested = delete_num, deleted, "delete done");
            }
            Err(e) => {
                self.stats.delete_failures += 1;
                warn!(
                    worker = self.id,
                    "delete of {} rows failed: {}", delete_num, e
                );
                pause(cancel, Duration::from_millis(self.config.delete_backoff_ms)).await;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub async fn run(mut self, cancel: CancellationToken) -> WorkerReport {
        info!(worker = self.id, table = %self.table, "churn worker started");
        let result = self.run_loop(&cancel).await;
        self.sync_write_stats();

        match &result {
            Ok(()) => info!(
                worker = self.id,
                inserted = self.stats.rows_inserted,
                deleted = self.stats.rows_deleted,
                "churn worker stopped"
            ),
            Err(e) => error!(worker = self.id, "churn worker failed: {}", e),
        }
        WorkerReport::new(WorkerKind::Churn, self.id, self.stats, result.err())
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut cycles: u64 = 0;
        while !cancel.is_cancelled() {
            if self
                .config
                .cycles_per_writer
                .map_or(false, |max| cycles >= max)
            {
                break;
            }
            let (insert_num, delete_num) = self.plan_cycle();
            self.run_cycle(insert_num, delete_num, cancel).await?;
            cycles += 1;
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn sync_write_stats(&mut self) {
        self.stats.rows_inserted = self.accumulator.rows_written();
        self.stats.batches_flushed = self.accumulator.flushes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::MockStorage;
    use crate::core::RandomRowSource;
    use crate::drivers::TidbDialect;
    use crate::error::HarnessError;
    use crate::workload::worker_rng;

    fn churn_config() -> ChurnConfig {
        ChurnConfig {
            max_insert: 20,
            max_delete: 20,
            delete_backoff_ms: 1000,
            cycles_per_writer: None,
        }
    }

    fn worker(storage: &MockStorage, threshold: usize, config: ChurnConfig) -> ChurnWorker {
        let dialect: Arc<dyn Dialect> = Arc::new(TidbDialect::new());
        let acc = BatchAccumulator::new(
            storage.connection(),
            dialect.insert_prefix("t"),
            threshold,
            2,
        )
        .unwrap();
        ChurnWorker::new(
            2,
            "t",
            acc,
            Box::new(RandomRowSource::new(5)),
            dialect,
            config,
            worker_rng(Some(5)),
        )
    }

    #[tokio::test]
    async fn test_zero_cycle_issues_no_statements() {
        let storage = MockStorage::new();
        let mut churn = worker(&storage, 10, churn_config());
        churn
            .run_cycle(0, 0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(storage.executed().is_empty());
    }

    #[tokio::test]
    async fn test_inserts_are_flushed_before_delete() {
        let storage = MockStorage::new();
        let mut churn = worker(&storage, 10, churn_config());
        churn
            .run_cycle(15, 7, &CancellationToken::new())
            .await
            .unwrap();

        let executed = storage.executed();
        assert_eq!(executed.len(), 3);
        assert!(executed[0].starts_with("INSERT INTO `t` VALUES"));
        assert!(executed[1].starts_with("INSERT INTO `t` VALUES"));
        assert_eq!(executed[2], "DELETE FROM `t` LIMIT 7");
        assert_eq!(churn.stats().rows_inserted, 15);
        assert_eq!(churn.stats().deletes_issued, 1);
    }

    #[tokio::test]
    async fn test_delete_only_cycle() {
        let storage = MockStorage::new();
        let mut churn = worker(&storage, 10, churn_config());
        churn
            .run_cycle(0, 3, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(storage.executed(), vec!["DELETE FROM `t` LIMIT 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_backs_off_and_continues() {
        let storage = MockStorage::new();
        storage.fail_statements("DELETE", 1);
        let mut churn = worker(&storage, 10, churn_config());
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        churn.run_cycle(0, 5, &cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(churn.stats().delete_failures, 1);

        churn.run_cycle(0, 5, &cancel).await.unwrap();
        assert_eq!(churn.stats().deletes_issued, 1);
        assert_eq!(storage.executed(), vec!["DELETE FROM `t` LIMIT 5"]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_fatal() {
        let storage = MockStorage::new();
        storage.fail_statements("INSERT", 1);
        let mut churn = worker(&storage, 10, churn_config());
        let err = churn
            .run_cycle(4, 4, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::FatalWrite { worker: 2, .. }));
        assert!(storage.executed_matching("DELETE").is_empty());
    }

    #[test]
    fn test_plan_cycle_within_bounds() {
        let storage = MockStorage::new();
        let mut churn = worker(&storage, 10, churn_config());
        for _ in 0..200 {
            let (insert_num, delete_num) = churn.plan_cycle();
            assert!(insert_num <= 20);
            assert!(delete_num <= 20);
        }
    }

    #[tokio::test]
    async fn test_cycle_limit_stops_worker() {
        let storage = MockStorage::new();
        let mut config = churn_config();
        config.cycles_per_writer = Some(4);
        let report = worker(&storage, 1000, config)
            .run(CancellationToken::new())
            .await;

        assert!(report.error.is_none());
        assert_eq!(report.kind, WorkerKind::Churn);
        let deletes = storage.executed_matching("DELETE").len() as u64;
        assert_eq!(report.stats.deletes_issued, deletes);
        assert!(deletes <= 4);
    }
}
