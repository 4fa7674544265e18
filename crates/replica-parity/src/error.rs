//! Error types for the harness.

use thiserror::Error;

use crate::verify::{CheckPhase, DivergenceReport};

/// Main error type for harness operations.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage system connection or query error
    #[error("Database error: {0}")]
    Database(#[from] mysql_async::Error),

    /// Connection setup error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Statement failure reported by a storage backend without a driver error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A batch write or insert statement failed. The owning worker must stop:
    /// a partially applied batch cannot be resolved by replaying it.
    #[error("Fatal write error in worker {worker}: {message}")]
    FatalWrite { worker: usize, message: String },

    /// A verification attempt could not complete. The attempt is abandoned
    /// and retried on the next cycle.
    #[error("Verification attempt failed at {phase}: {message}")]
    TransientVerify { phase: CheckPhase, message: String },

    /// The two read engines disagreed at one snapshot.
    #[error("{0}")]
    Divergence(Box<DivergenceReport>),

    /// A worker task panicked or was aborted
    #[error("Worker {worker} terminated abnormally: {message}")]
    WorkerAborted { worker: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Run cancelled")]
    Cancelled,
}

impl HarnessError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        HarnessError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a FatalWrite error
    pub fn fatal_write(worker: usize, message: impl Into<String>) -> Self {
        HarnessError::FatalWrite {
            worker,
            message: message.into(),
        }
    }

    /// Create a TransientVerify error
    pub fn transient(phase: CheckPhase, message: impl ToString) -> Self {
        HarnessError::TransientVerify {
            phase,
            message: message.to_string(),
        }
    }

    /// Whether the failed operation may simply be retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, HarnessError::TransientVerify { .. })
    }

    /// Whether this error must stop the whole run rather than one worker.
    pub fn is_divergence(&self) -> bool {
        matches!(self, HarnessError::Divergence(_))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::Config(_) | HarnessError::Yaml(_) => 2,
            HarnessError::Divergence(_) => 3,
            HarnessError::FatalWrite { .. } => 4,
            HarnessError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
