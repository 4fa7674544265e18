//! Serialized rows and the random row generator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::traits::RowSource;

/// One pre-serialized value-list entry, e.g. `('abc',42,0.500000)`.
///
/// The text is embedded verbatim after `VALUES` in a multi-row insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(String);

impl Row {
    /// Wrap an already serialized value list.
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    /// The serialized value list.
    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

impl From<String> for Row {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Row {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Adapts a closure into a [`RowSource`].
pub struct FnRowSource<F>(pub F);

impl<F> RowSource for FnRowSource<F>
where
    F: FnMut() -> Row + Send,
{
    fn next_row(&mut self) -> Row {
        (self.0)()
    }
}

/// Column kinds of the generated account/agent transaction rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Quoted letters, length 1..=max.
    Text(usize),
    /// Non-negative 63-bit integer.
    BigInt,
    /// Integer in 0..max.
    Int(i64),
    /// Float in [0, 1) rendered with six decimals.
    Double,
}

/// Layout of `rpt_sdb_account_agent_trans_d`.
pub const ACCOUNT_AGENT_COLUMNS: [ColumnKind; 26] = [
    ColumnKind::Text(512),
    ColumnKind::Text(512),
    ColumnKind::Text(512),
    ColumnKind::Text(1000),
    ColumnKind::Text(1000),
    ColumnKind::BigInt,
    ColumnKind::Int(10_000),
    ColumnKind::Double,
    ColumnKind::BigInt,
    ColumnKind::BigInt,
    ColumnKind::BigInt,
    ColumnKind::BigInt,
    ColumnKind::BigInt,
    ColumnKind::Double,
    ColumnKind::BigInt,
    ColumnKind::Double,
    ColumnKind::BigInt,
    ColumnKind::Double,
    ColumnKind::Double,
    ColumnKind::BigInt,
    ColumnKind::BigInt,
    ColumnKind::BigInt,
    ColumnKind::Text(100),
    ColumnKind::Text(100),
    ColumnKind::Text(100),
    ColumnKind::Text(100),
];

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Seeded generator of synthetic rows.
pub struct RandomRowSource {
    rng: StdRng,
    columns: Vec<ColumnKind>,
}

impl RandomRowSource {
    /// Generator for the default account/agent layout.
    pub fn new(seed: u64) -> Self {
        Self::with_columns(seed, ACCOUNT_AGENT_COLUMNS.to_vec())
    }

    /// Generator for an arbitrary column layout.
    pub fn with_columns(seed: u64, columns: Vec<ColumnKind>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            columns,
        }
    }

    /// Generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            columns: ACCOUNT_AGENT_COLUMNS.to_vec(),
        }
    }

    fn push_value(&mut self, out: &mut String, kind: ColumnKind) {
        match kind {
            ColumnKind::Text(max) => {
                let len = self.rng.gen_range(1..=max.max(1));
                out.reserve(len + 2);
                out.push('\'');
                for _ in 0..len {
                    let idx = self.rng.gen_range(0..LETTERS.len());
                    out.push(LETTERS[idx] as char);
                }
                out.push('\'');
            }
            ColumnKind::BigInt => {
                let v: i64 = self.rng.gen_range(0..=i64::MAX);
                out.push_str(&v.to_string());
            }
            ColumnKind::Int(max) => {
                let v = self.rng.gen_range(0..max.max(1));
                out.push_str(&v.to_string());
            }
            ColumnKind::Double => {
                let v: f64 = self.rng.gen();
                out.push_str(&format!("{:.6}", v));
            }
        }
    }
}

impl RowSource for RandomRowSource {
    fn next_row(&mut self) -> Row {
        let mut out = String::from("(");
        for i in 0..self.columns.len() {
            if i > 0 {
                out.push(',');
            }
            let kind = self.columns[i];
            self.push_value(&mut out, kind);
        }
        out.push(')');
        Row(out)
    }
}
