//! Multi-row insert batching.
//!
//! [`BatchAccumulator`] concatenates serialized rows behind a statement prefix
//! such as `INSERT INTO t VALUES` and ships them as one statement once the
//! configured number of rows is pending:
//!
//! ```text
//! INSERT INTO t VALUES (..), (..), (..)
//! ```
//!
//! A failed flush is fatal for the owning worker. The statement embeds
//! literal values and may have been partially applied, so it is neither
//! retried nor discarded; the pending rows stay in the buffer and the error
//! is returned as [`HarnessError::FatalWrite`].

use tracing::{debug, error};

use crate::core::{BoxConnection, Row};
use crate::error::{HarnessError, Result};

const VALUE_SEPARATOR: &str = ", ";

/// Buffers rows for one connection and writes them in batches.
pub struct BatchAccumulator {
    conn: BoxConnection,
    template: String,
    threshold: usize,
    worker: usize,
    buf: String,
    pending: usize,
    flushes: u64,
    rows_written: u64,
}

impl BatchAccumulator {
    /// Create an accumulator bound to `conn`.
    ///
    /// `template` starts every batch (e.g. `INSERT INTO t VALUES`). A zero
    /// `threshold` is rejected.
    pub fn new(
        conn: BoxConnection,
        template: impl Into<String>,
        threshold: usize,
        worker: usize,
    ) -> Result<Self> {
        if threshold == 0 {
            return Err(HarnessError::Config(
                "batch threshold must be at least 1".into(),
            ));
        }
        Ok(Self {
            conn,
            template: template.into(),
            threshold,
            worker,
            buf: String::new(),
            pending: 0,
            flushes: 0,
            rows_written: 0,
        })
    }

    /// Append a row, flushing when the threshold is reached.
    pub async fn insert_value(&mut self, row: &Row) -> Result<()> {
        if self.pending == 0 {
            self.buf.push_str(&self.template);
            self.buf.push(' ');
        } else {
            self.buf.push_str(VALUE_SEPARATOR);
        }
        self.buf.push_str(row.as_sql());
        self.pending += 1;

        if self.pending >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write all pending rows as one statement. No-op when nothing is pending.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }

        if let Err(e) = self.conn.execute(&self.buf).await {
            error!(
                worker = self.worker,
                pending = self.pending,
                "batch write failed: {}",
                e
            );
            return Err(HarnessError::fatal_write(
                self.worker,
                format!("flushing {} rows: {}", self.pending, e),
            ));
        }

        debug!(worker = self.worker, rows = self.pending, "flushed batch");
        self.flushes += 1;
        self.rows_written += self.pending as u64;
        self.buf.clear();
        self.pending = 0;
        Ok(())
    }

    /// Rows buffered but not yet written.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// The statement that the next flush would execute.
    pub fn buffered_statement(&self) -> &str {
        &self.buf
    }

    /// Number of successful flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Rows written by successful flushes.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// The bound connection, for statements that must run on the same
    /// session as the batches (e.g. churn deletes).
    pub fn connection_mut(&mut self) -> &mut BoxConnection {
        &mut self.conn
    }
}
