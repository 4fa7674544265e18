//! Run orchestrator - spawns and supervises the worker tasks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::BatchAccumulator;
use crate::config::{Config, MutationMode};
use crate::core::{Connector, Dialect, RandomRowSource, RowSource};
use crate::drivers::TidbConnector;
use crate::error::{HarnessError, Result};
use crate::verify::{ConsistencyChecker, DivergenceReport, VerificationWorker};
use crate::workload::{
    prepare, worker_rng, ChurnWorker, InsertWorker, PrepareReport, WorkerKind, WorkerReport,
    WorkerStats,
};

/// Run orchestrator.
pub struct Orchestrator {
    config: Config,
    connector: Arc<dyn Connector>,
}

/// A worker that stopped with an error other than a divergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedWorker {
    /// Worker label, e.g. `insert-3`.
    pub worker: String,
    pub error: String,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, cancelled, diverged or failed.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Table written and verified.
    pub table: String,

    /// Mutation mode of the writers.
    pub mutation: String,

    /// Mutation workers spawned.
    pub writers: usize,

    /// Verification workers spawned.
    pub verifiers: usize,

    /// Counters summed over all workers.
    pub stats: WorkerStats,

    /// Workers that stopped with an error.
    pub failed_workers: Vec<FailedWorker>,

    /// First divergence reported by a verifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divergence: Option<DivergenceReport>,
}

impl RunReport {
    /// Convert to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create an orchestrator connected to the configured TiDB cluster.
    pub async fn new(config: Config) -> Result<Self> {
        let connector = TidbConnector::new(&config.target, config.max_connections()).await?;
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Create an orchestrator over an existing connector.
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bootstrap the workload table.
    pub async fn prepare(&self) -> Result<PrepareReport> {
        prepare(self.connector.as_ref(), &self.config).await
    }

    /// Run all workers until `cancel` fires, every worker reaches its limit,
    /// or a verifier reports a divergence.
    ///
    /// A divergence cancels every other worker and is recorded in the report
    /// with status `diverged`. A worker failing for any other reason only
    /// stops that worker; it is listed in the report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let workload = &self.config.workload;
        let writers = workload.get_writers();
        let verifiers = workload.get_verifiers();

        info!(
            "Starting run {} on {} ({}): mutation={}, writers={}, verifiers={}",
            run_id,
            workload.table,
            self.connector.backend(),
            workload.mutation,
            writers,
            verifiers
        );

        // Child token: a divergence stops this run without touching the caller's token.
        let run_cancel = cancel.child_token();
        let mut tasks: JoinSet<WorkerReport> = JoinSet::new();
        let mut labels: HashMap<Id, String> = HashMap::new();

        let writer_kind = mutation_kind(workload.mutation);
        for id in 0..writers {
            let connector = self.connector.clone();
            let config = self.config.clone();
            let token = run_cancel.clone();
            let handle =
                tasks.spawn(async move { run_mutation_worker(id, connector, config, token).await });
            labels.insert(handle.id(), format!("{}-{}", writer_kind, id));
        }

        for id in 0..verifiers {
            let connector = self.connector.clone();
            let config = self.config.clone();
            let token = run_cancel.clone();
            let handle = tasks
                .spawn(async move { run_verification_worker(id, connector, config, token).await });
            labels.insert(handle.id(), format!("{}-{}", WorkerKind::Verify, id));
        }

        let mut stats = WorkerStats::default();
        let mut failed_workers = Vec::new();
        let mut divergence: Option<DivergenceReport> = None;

        while let Some(joined) = tasks.join_next_with_id().await {
            let report = match joined {
                Ok((id, report)) => {
                    labels.remove(&id);
                    report
                }
                Err(e) => {
                    let worker = labels
                        .remove(&e.id())
                        .unwrap_or_else(|| format!("task-{}", e.id()));
                    error!("{} terminated abnormally: {}", worker, e);
                    let err = HarnessError::WorkerAborted {
                        worker: worker.clone(),
                        message: e.to_string(),
                    };
                    failed_workers.push(FailedWorker {
                        worker,
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            stats.merge(&report.stats);
            let label = report.label();
            match report.error {
                Some(HarnessError::Divergence(found)) => {
                    if divergence.is_none() {
                        error!("{} reported a divergence, stopping all workers", label);
                        run_cancel.cancel();
                        divergence = Some(*found);
                    }
                }
                Some(err) => {
                    warn!("{} stopped: {}", label, err);
                    failed_workers.push(FailedWorker {
                        worker: label,
                        error: err.to_string(),
                    });
                }
                None => {}
            }
        }

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let status = if divergence.is_some() {
            "diverged"
        } else if !failed_workers.is_empty() {
            "failed"
        } else if cancel.is_cancelled() {
            "cancelled"
        } else {
            "completed"
        };

        let report = RunReport {
            run_id,
            status: status.to_string(),
            duration_seconds,
            started_at,
            completed_at,
            table: workload.table.clone(),
            mutation: workload.mutation.to_string(),
            writers,
            verifiers,
            stats,
            failed_workers,
            divergence,
        };

        info!(
            "Run {}: {} rows inserted, {} rows deleted, {} checks passed, {} transient errors in {:.1}s",
            report.status,
            report.stats.rows_inserted,
            report.stats.rows_deleted,
            report.stats.checks_passed,
            report.stats.transient_errors,
            report.duration_seconds
        );
        if let Some(found) = &report.divergence {
            error!("{}", found);
        }

        Ok(report)
    }
}

fn mutation_kind(mode: MutationMode) -> WorkerKind {
    match mode {
        MutationMode::Churn => WorkerKind::Churn,
        _ => WorkerKind::Insert,
    }
}

async fn run_mutation_worker(
    id: usize,
    connector: Arc<dyn Connector>,
    config: Config,
    cancel: CancellationToken,
) -> WorkerReport {
    let workload = config.workload;
    let kind = mutation_kind(workload.mutation);

    let dialect = connector.dialect();
    let conn = match connector.connect().await {
        Ok(conn) => conn,
        Err(e) => return WorkerReport::failed(kind, id, e),
    };
    let accumulator = match BatchAccumulator::new(
        conn,
        dialect.insert_prefix(&workload.table),
        workload.batch_size,
        id,
    ) {
        Ok(acc) => acc,
        Err(e) => return WorkerReport::failed(kind, id, e),
    };

    let seed = workload.worker_seed(id);
    let source: Box<dyn RowSource> = Box::new(match seed {
        Some(seed) => RandomRowSource::new(seed),
        None => RandomRowSource::from_entropy(),
    });

    match kind {
        WorkerKind::Churn => {
            // Cycle sizes come from a stream independent of the row contents.
            let rng = worker_rng(seed.map(|s| !s));
            ChurnWorker::new(
                id,
                workload.table,
                accumulator,
                source,
                dialect,
                config.churn,
                rng,
            )
            .run(cancel)
            .await
        }
        _ => {
            InsertWorker::new(id, accumulator, source, workload.rows_per_writer)
                .run(cancel)
                .await
        }
    }
}

async fn run_verification_worker(
    id: usize,
    connector: Arc<dyn Connector>,
    config: Config,
    cancel: CancellationToken,
) -> WorkerReport {
    let dialect: Arc<dyn Dialect> = connector.dialect();
    let conn = match connector.connect().await {
        Ok(conn) => conn,
        Err(e) => return WorkerReport::failed(WorkerKind::Verify, id, e),
    };

    let checker = ConsistencyChecker::new(dialect.as_ref(), &config.workload.table, id);
    let setup = dialect.verifier_session_setup(config.verify.disable_batch_cop);
    // Verifier streams are offset so they never share a seed with writer `id`.
    let rng = worker_rng(
        config
            .workload
            .worker_seed(id)
            .map(|s| s.wrapping_add(1 << 32)),
    );

    VerificationWorker::new(id, conn, checker, config.verify, rng)
        .with_session_setup(setup)
        .run(cancel)
        .await
}
