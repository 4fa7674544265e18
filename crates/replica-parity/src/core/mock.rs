//! In-memory storage double used by unit tests.
//!
//! Records every statement, begin, commit and rollback, and answers count
//! queries from a script of `(replica, primary)` pairs consumed one pair per
//! transaction.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{HarnessError, Result};

use crate::drivers::TidbDialect;

use super::traits::{
    BoxConnection, Connector, Dialect, ReadEngine, SnapshotTxn, StorageConnection,
};

#[derive(Debug, Default)]
pub struct MockState {
    pub connects: usize,
    pub executed: Vec<String>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub reads: Vec<(u64, ReadEngine, String)>,
    pub next_ts: u64,
    pub scripted_counts: VecDeque<(i64, i64)>,
    pub default_counts: (i64, i64),
    /// Statements containing the pattern fail while the budget is non-zero.
    pub execute_failures: Vec<(String, usize)>,
    pub begin_failures: usize,
    pub replica_read_failures: usize,
    pub connect_failures: usize,
    /// `connect` panics while non-zero.
    pub connect_panics: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    state: Arc<Mutex<MockState>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn connection(&self) -> BoxConnection {
        Box::new(MockConnection {
            state: self.state.clone(),
        })
    }

    pub fn with_counts(self, replica: i64, primary: i64) -> Self {
        self.state().default_counts = (replica, primary);
        self
    }

    pub fn script_counts(&self, counts: &[(i64, i64)]) {
        self.state().scripted_counts.extend(counts.iter().copied());
    }

    pub fn fail_statements(&self, pattern: &str, times: usize) {
        self.state()
            .execute_failures
            .push((pattern.to_string(), times));
    }

    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn executed_matching(&self, pattern: &str) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .filter(|s| s.contains(pattern))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Connector for MockStorage {
    async fn connect(&self) -> Result<BoxConnection> {
        {
            let mut state = self.state();
            if state.connect_panics > 0 {
                state.connect_panics -= 1;
                drop(state);
                panic!("injected connect panic");
            }
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(HarnessError::connection("refused", "mock connect"));
            }
            state.connects += 1;
        }
        Ok(self.connection())
    }

    fn backend(&self) -> &str {
        "mock"
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(TidbDialect::new())
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl StorageConnection for MockConnection {
    async fn execute(&mut self, statement: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        for (pattern, budget) in state.execute_failures.iter_mut() {
            if *budget > 0 && statement.contains(pattern.as_str()) {
                *budget -= 1;
                return Err(HarnessError::Storage(format!(
                    "injected failure for '{}'",
                    pattern
                )));
            }
        }
        state.executed.push(statement.to_string());
        Ok(1)
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn SnapshotTxn + 'a>> {
        let mut state = self.state.lock().unwrap();
        if state.begin_failures > 0 {
            state.begin_failures -= 1;
            return Err(HarnessError::Storage("injected begin failure".into()));
        }
        state.begins += 1;
        state.next_ts += 1;
        let ts = state.next_ts;
        let counts = state
            .scripted_counts
            .pop_front()
            .unwrap_or(state.default_counts);
        Ok(Box::new(MockTxn {
            state: self.state.clone(),
            ts,
            counts,
        }))
    }
}

pub struct MockTxn {
    state: Arc<Mutex<MockState>>,
    ts: u64,
    counts: (i64, i64),
}

#[async_trait]
impl SnapshotTxn for MockTxn {
    fn start_ts(&self) -> u64 {
        self.ts
    }

    async fn query_count(&mut self, engine: ReadEngine, statement: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if engine == ReadEngine::Replica && state.replica_read_failures > 0 {
            state.replica_read_failures -= 1;
            return Err(HarnessError::Storage("injected replica read failure".into()));
        }
        state.reads.push((self.ts, engine, statement.to_string()));
        Ok(match engine {
            ReadEngine::Replica => self.counts.0,
            ReadEngine::Primary => self.counts.1,
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}
