//! replica-parity CLI - write workload and cross-engine consistency checks for TiDB.

use clap::{Parser, Subcommand};
use replica_parity::drivers::TidbConnector;
use replica_parity::{Config, HarnessError, MutationMode, Orchestrator, RunReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code of a run that found the engines diverged.
const EXIT_DIVERGED: u8 = 3;

/// Exit code of a run in which a worker stopped on a write failure.
const EXIT_WORKER_FAILED: u8 = 4;

#[derive(Parser)]
#[command(name = "replica-parity")]
#[command(about = "Write workload and snapshot consistency checker for TiDB replicas")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Base seed for the workers' random generators
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the workload table and request analytical replicas
    Prepare,

    /// Run mutation and verification workers until interrupted
    Run {
        /// Mutation mode: insert, churn or none
        #[arg(long)]
        mutation: Option<MutationMode>,

        /// Override number of mutation workers
        #[arg(long)]
        writers: Option<usize>,

        /// Override number of verification workers
        #[arg(long)]
        verifiers: Option<usize>,

        /// Override the workload table
        #[arg(long)]
        table: Option<String>,

        /// Override rows per multi-row insert
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Test the database connection and replica status
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, HarnessError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    // Validated per command, after the overrides are applied.
    let mut config = Config::load_unvalidated(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Some(seed) = cli.seed {
        config.workload.seed = Some(seed);
    }

    match cli.command {
        Commands::Prepare => {
            config.validate()?;
            let config = config.with_auto_tuning();
            let cancel_token = setup_signal_handler()?;
            let orchestrator = Orchestrator::new(config).await?;

            let report = tokio::select! {
                result = orchestrator.prepare() => result?,
                _ = cancel_token.cancelled() => return Err(HarnessError::Cancelled),
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nPrepare completed!");
                println!("  Table: {}", report.table);
                println!("  Schema statements: {}", report.schema_statements);
                println!("  Recreated: {}", report.table_recreated);
                match report.replica_requested {
                    Some(n) => println!("  Replicas requested: {}", n),
                    None => println!("  Replicas requested: none"),
                }
                println!("  Rows preloaded: {}", report.rows_preloaded);
            }
        }

        Commands::Run {
            mutation,
            writers,
            verifiers,
            table,
            batch_size,
        } => {
            // Apply overrides
            if let Some(mode) = mutation {
                config.workload.mutation = mode;
            }
            if let Some(w) = writers {
                config.workload.writers = Some(w);
            }
            if let Some(v) = verifiers {
                config.workload.verifiers = Some(v);
            }
            if let Some(t) = table {
                config.workload.table = t;
            }
            if let Some(b) = batch_size {
                config.workload.batch_size = b;
            }
            config.validate()?;
            let config = config.with_auto_tuning();

            let cancel_token = setup_signal_handler()?;
            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_summary(&report);
            }

            match report.status.as_str() {
                "diverged" => return Ok(ExitCode::from(EXIT_DIVERGED)),
                "failed" => return Ok(ExitCode::from(EXIT_WORKER_FAILED)),
                _ => {}
            }
        }

        Commands::HealthCheck => {
            config.validate()?;
            let connector = TidbConnector::new(&config.target, 1).await?;
            let report = connector.health_check(&config.workload.table).await;
            connector.disconnect().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  TiDB {}: {} ({}ms)",
                    report.endpoint,
                    if report.connected { "OK" } else { "FAILED" },
                    report.latency_ms
                );
                if let Some(ref version) = report.version {
                    println!("    Version: {}", version);
                }
                match report.replica {
                    Some(ref replica) => println!(
                        "  Replica of {}: {} of {} ({:.0}% synced)",
                        report.table,
                        if replica.available { "AVAILABLE" } else { "UNAVAILABLE" },
                        replica.replica_count,
                        replica.progress * 100.0
                    ),
                    None => println!("  Replica of {}: not configured", report.table),
                }
                if let Some(ref err) = report.error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if report.healthy() { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !report.healthy() {
                return Err(HarnessError::Storage("Health check failed".to_string()));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(report: &RunReport) {
    println!("\nRun {}!", report.status);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Table: {} (mutation: {})", report.table, report.mutation);
    println!(
        "  Workers: {} writers, {} verifiers",
        report.writers, report.verifiers
    );
    println!(
        "  Rows: {} inserted in {} batches, {} deleted",
        report.stats.rows_inserted, report.stats.batches_flushed, report.stats.rows_deleted
    );
    println!(
        "  Checks: {} passed, {} transient errors",
        report.stats.checks_passed, report.stats.transient_errors
    );
    if report.stats.delete_failures > 0 {
        println!("  Delete failures: {}", report.stats.delete_failures);
    }
    for failed in &report.failed_workers {
        println!("  Failed worker {}: {}", failed.worker, failed.error);
    }
    if let Some(ref divergence) = report.divergence {
        println!("  Divergence: {}", divergence);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, HarnessError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping workers...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, HarnessError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping workers...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
