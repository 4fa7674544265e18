//! Insert-only mutation worker.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::batch::BatchAccumulator;
use crate::core::RowSource;
use crate::error::Result;

use super::{WorkerKind, WorkerReport, WorkerStats};

/// Streams generated rows into the table through a [`BatchAccumulator`].
///
/// Runs until cancelled or until `max_rows` rows were produced, then writes
/// whatever is still buffered. A failed batch stops the worker without a
/// final flush.
pub struct InsertWorker {
    id: usize,
    accumulator: BatchAccumulator,
    source: Box<dyn RowSource>,
    max_rows: Option<u64>,
}

impl InsertWorker {
    pub fn new(
        id: usize,
        accumulator: BatchAccumulator,
        source: Box<dyn RowSource>,
        max_rows: Option<u64>,
    ) -> Self {
        Self {
            id,
            accumulator,
            source,
            max_rows,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> WorkerReport {
        info!(worker = self.id, "insert worker started");
        let result = self.run_loop(&cancel).await;

        let stats = WorkerStats {
            rows_inserted: self.accumulator.rows_written(),
            batches_flushed: self.accumulator.flushes(),
            ..Default::default()
        };
        match &result {
            Ok(()) => info!(
                worker = self.id,
                rows = stats.rows_inserted,
                batches = stats.batches_flushed,
                "insert worker stopped"
            ),
            Err(e) => error!(worker = self.id, "insert worker failed: {}", e),
        }
        WorkerReport::new(WorkerKind::Insert, self.id, stats, result.err())
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut produced: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                debug!(worker = self.id, "cancelled");
                break;
            }
            if self.max_rows.map_or(false, |max| produced >= max) {
                break;
            }

            let row = self.source.next_row();
            self.accumulator.insert_value(&row).await?;
            produced += 1;

            // Give other tasks a turn after every batch.
            if self.accumulator.is_empty() {
                tokio::task::yield_now().await;
            }
        }
        self.accumulator.flush().await
    }
}
