//! Snapshot consistency verification between the two read engines.
//!
//! A [`VerificationWorker`] repeatedly asks its [`ConsistencyChecker`] to
//! compare `COUNT(*)` of the workload table on the analytical replica and on
//! the primary store, both read inside one transaction and therefore at one
//! logical timestamp.
//!
//! Outcomes of a check:
//!
//! - **match**: the transaction commits, the worker sleeps the check interval.
//! - **transient failure** (snapshot or read error): logged, retried after
//!   the backoff.
//! - **mismatch**: re-checked once at a fresh snapshot, then reported as a
//!   [`HarnessError::Divergence`], which ends the run whatever the re-check
//!   returned.

mod checker;
mod types;

pub use checker::ConsistencyChecker;
pub use types::{CheckPhase, ComparisonResult, DivergenceReport};

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::VerifyConfig;
use crate::core::BoxConnection;
use crate::error::{HarnessError, Result};
use crate::workload::{pause, WorkerKind, WorkerReport, WorkerStats};

/// Long-running verifier owning one connection.
pub struct VerificationWorker {
    id: usize,
    conn: BoxConnection,
    checker: ConsistencyChecker,
    config: VerifyConfig,
    session_setup: Vec<String>,
    rng: StdRng,
    stats: WorkerStats,
}

impl VerificationWorker {
    pub fn new(
        id: usize,
        conn: BoxConnection,
        checker: ConsistencyChecker,
        config: VerifyConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            conn,
            checker,
            config,
            session_setup: Vec::new(),
            rng,
            stats: WorkerStats::default(),
        }
    }

    /// Statements executed once on the connection before the first check.
    pub fn with_session_setup(mut self, statements: Vec<String>) -> Self {
        self.session_setup = statements;
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) -> WorkerReport {
        info!(worker = self.id, table = %self.checker.table(), "verifier started");
        let result = self.run_loop(&cancel).await;

        match &result {
            Ok(()) => info!(
                worker = self.id,
                passed = self.stats.checks_passed,
                transient = self.stats.transient_errors,
                "verifier stopped"
            ),
            Err(e) if e.is_divergence() => {}
            Err(e) => error!(worker = self.id, "verifier failed: {}", e),
        }
        WorkerReport::new(WorkerKind::Verify, self.id, self.stats, result.err())
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<()> {
        for statement in &self.session_setup {
            debug!(worker = self.id, "session setup: {}", statement);
            self.conn.execute(statement).await?;
        }

        let interval = Duration::from_millis(self.config.interval_ms);
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);

        while !cancel.is_cancelled() {
            if self
                .config
                .checks_per_verifier
                .map_or(false, |max| self.stats.checks_passed >= max)
            {
                break;
            }

            let jitter = self.next_jitter();
            match self.checker.check(&mut self.conn, jitter).await {
                Ok(result) if result.matched => {
                    self.stats.checks_passed += 1;
                    info!(
                        worker = self.id,
                        tso = result.snapshot_ts,
                        replica = result.replica_count,
                        primary = result.primary_count,
                        "counts match"
                    );
                    pause(cancel, interval).await;
                }
                Ok(result) => {
                    self.stats.mismatches += 1;
                    return Err(self.confirm(result).await);
                }
                Err(e) if e.is_transient() => {
                    self.stats.transient_errors += 1;
                    warn!(worker = self.id, "check abandoned: {}", e);
                    pause(cancel, backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Re-check once at a new snapshot and build the divergence error.
    async fn confirm(&mut self, first: ComparisonResult) -> HarnessError {
        warn!(
            worker = self.id,
            tso = first.snapshot_ts,
            "mismatch detected, re-checking at a new snapshot"
        );
        let confirmation = match self.checker.check(&mut self.conn, Duration::ZERO).await {
            Ok(result) => {
                if !result.matched {
                    self.stats.mismatches += 1;
                }
                Some(result)
            }
            Err(e) => {
                self.stats.transient_errors += 1;
                warn!(worker = self.id, "re-check did not complete: {}", e);
                None
            }
        };

        let report = DivergenceReport {
            worker: self.id,
            table: self.checker.table().to_string(),
            first,
            confirmation,
        };
        error!(
            worker = self.id,
            reproduced = report.reproduced(),
            "{}",
            report
        );
        HarnessError::Divergence(Box::new(report))
    }

    fn next_jitter(&mut self) -> Duration {
        if self.config.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..=self.config.max_jitter_ms))
    }
}
