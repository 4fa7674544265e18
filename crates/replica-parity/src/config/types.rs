//! Configuration type definitions with auto-tuning based on system resources.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        Self {
            cpu_cores: sys.cpus().len().max(1),
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage system under test.
    #[serde(default)]
    pub target: TargetConfig,

    /// Worker layout and write path settings.
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Churn mode settings.
    #[serde(default)]
    pub churn: ChurnConfig,

    /// Verification settings.
    #[serde(default)]
    pub verify: VerifyConfig,

    /// Table bootstrap settings used by `prepare`.
    #[serde(default)]
    pub prepare: PrepareConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        info!("System resources: {} CPU cores", resources.cpu_cores);
        self.workload = self.workload.with_auto_tuning(&resources);
        self
    }

    /// Connections the run needs: one per worker plus one for setup.
    pub fn max_connections(&self) -> usize {
        self.workload.get_writers() + self.workload.get_verifiers() + 1
    }
}

/// Storage system (TiDB) connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// SQL port (default: 4000).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name (default: "test").
    #[serde(default = "default_database")]
    pub database: String,

    /// Username (default: "root").
    #[serde(default = "default_user")]
    pub user: String,

    /// Password (default: empty).
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: String::new(),
            ssl_mode: default_ssl_mode(),
        }
    }
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// What the mutation workers do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationMode {
    /// Insert-only bulk load through the batch accumulator.
    #[default]
    Insert,

    /// Insert/delete cycles keeping the table size roughly stable.
    Churn,

    /// No mutation workers; verification only.
    None,
}

impl std::fmt::Display for MutationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationMode::Insert => write!(f, "insert"),
            MutationMode::Churn => write!(f, "churn"),
            MutationMode::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for MutationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" | "update" => Ok(MutationMode::Insert),
            "churn" | "stable" => Ok(MutationMode::Churn),
            "none" | "off" => Ok(MutationMode::None),
            other => Err(format!(
                "unknown mutation mode '{}'. Supported: insert, churn, none",
                other
            )),
        }
    }
}

/// Worker layout and write path configuration.
/// Worker counts use Option<T> to distinguish "not set" (auto-tuned) from
/// "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Table written and verified.
    #[serde(default = "default_table")]
    pub table: String,

    /// Mutation worker behavior (default: insert).
    #[serde(default)]
    pub mutation: MutationMode,

    /// Mutation workers. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writers: Option<usize>,

    /// Verification workers. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifiers: Option<usize>,

    /// Rows per multi-row insert (default: 512).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Base RNG seed. Worker `i` uses `seed + i`. Random when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Stop each insert worker after this many rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_per_writer: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            mutation: MutationMode::default(),
            writers: None,
            verifiers: None,
            batch_size: default_batch_size(),
            seed: None,
            rows_per_writer: None,
        }
    }
}

impl WorkloadConfig {
    /// Fill in worker counts that are None.
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        let cores = resources.cpu_cores;

        // Writers: one per core, 2..=32
        if self.writers.is_none() {
            let writers = if self.mutation == MutationMode::None {
                0
            } else {
                cores.clamp(2, 32)
            };
            self.writers = Some(writers);
        }

        // Verifiers: a quarter of the cores, 1..=8
        if self.verifiers.is_none() {
            self.verifiers = Some((cores / 4).clamp(1, 8));
        }

        info!(
            "Auto-tuned workload: mutation={}, writers={}, verifiers={}, batch_size={}",
            self.mutation,
            self.get_writers(),
            self.get_verifiers(),
            self.batch_size
        );

        self
    }

    /// Effective mutation worker count.
    pub fn get_writers(&self) -> usize {
        if self.mutation == MutationMode::None {
            return 0;
        }
        self.writers.unwrap_or(4)
    }

    /// Effective verification worker count.
    pub fn get_verifiers(&self) -> usize {
        self.verifiers.unwrap_or(1)
    }

    /// Seed for worker `index`, if the run is seeded.
    pub fn worker_seed(&self, index: usize) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(index as u64))
    }

    /// Seed of the prepare-time preload, offset away from every writer seed.
    pub fn preload_seed(&self) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(1 << 33))
    }
}

/// Churn (stable workload) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnConfig {
    /// Upper bound of rows inserted per cycle (default: 1000).
    #[serde(default = "default_churn_bound")]
    pub max_insert: u64,

    /// Upper bound of rows deleted per cycle (default: 1000).
    #[serde(default = "default_churn_bound")]
    pub max_delete: u64,

    /// Sleep after a failed delete in milliseconds (default: 1000).
    #[serde(default = "default_backoff_ms")]
    pub delete_backoff_ms: u64,

    /// Stop each churn worker after this many cycles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles_per_writer: Option<u64>,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            max_insert: default_churn_bound(),
            max_delete: default_churn_bound(),
            delete_backoff_ms: default_backoff_ms(),
            cycles_per_writer: None,
        }
    }
}

/// Verification worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Pause after a matching check in milliseconds (default: 100).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Pause after a failed attempt in milliseconds (default: 1000).
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound of the random pause between taking the snapshot and
    /// reading, in milliseconds (default: 0, no jitter).
    #[serde(default)]
    pub max_jitter_ms: u64,

    /// Disable batched coprocessor requests on verifier sessions (default: true).
    #[serde(default = "default_true")]
    pub disable_batch_cop: bool,

    /// Stop each verifier after this many matching checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks_per_verifier: Option<u64>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            retry_backoff_ms: default_backoff_ms(),
            max_jitter_ms: 0,
            disable_batch_cop: true,
            checks_per_verifier: None,
        }
    }
}

/// Table bootstrap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    /// DDL file executed before the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,

    /// Analytical replicas requested for the table (default: 2).
    #[serde(default = "default_replica")]
    pub replica: u32,

    /// Recreate the workload table as `CREATE TABLE .. LIKE like_table`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_table: Option<String>,

    /// Rows inserted after the table is created (default: 0).
    #[serde(default)]
    pub preload_rows: u64,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            schema_file: None,
            replica: default_replica(),
            like_table: None,
            preload_rows: 0,
        }
    }
}

// Default value functions for serde
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_database() -> String {
    "test".to_string()
}

fn default_user() -> String {
    "root".to_string()
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_table() -> String {
    "rpt_sdb_account_agent_trans_d".to_string()
}

fn default_batch_size() -> usize {
    512
}

fn default_churn_bound() -> u64 {
    1000
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_interval_ms() -> u64 {
    100
}

fn default_replica() -> u32 {
    2
}

fn default_true() -> bool {
    true
}
