//! Workload table bootstrap.
//!
//! Runs before the workers start, on its own connection:
//!
//! 1. Apply the schema file, if any.
//! 2. Recreate the workload table `LIKE` another table, if configured.
//! 3. Request analytical replicas for the workload table.
//! 4. Preload rows through a [`BatchAccumulator`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::BatchAccumulator;
use crate::config::Config;
use crate::core::{BoxConnection, Connector, Dialect, RandomRowSource, RowSource};
use crate::error::Result;

/// What [`prepare`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareReport {
    pub table: String,
    pub schema_statements: usize,
    pub table_recreated: bool,
    pub replica_requested: Option<u32>,
    pub rows_preloaded: u64,
}

/// Bootstrap the workload table described by `config`.
pub async fn prepare(connector: &dyn Connector, config: &Config) -> Result<PrepareReport> {
    let dialect = connector.dialect();
    let table = config.workload.table.as_str();
    let mut conn = connector.connect().await?;
    let mut report = PrepareReport {
        table: table.to_string(),
        ..Default::default()
    };

    if let Some(path) = &config.prepare.schema_file {
        info!("Applying schema file {:?}", path);
        let ddl = std::fs::read_to_string(path)?;
        report.schema_statements = apply_schema(&mut conn, &ddl).await?;
    }

    if let Some(like) = &config.prepare.like_table {
        recreate_like(&mut conn, dialect.as_ref(), table, like).await?;
        report.table_recreated = true;
    }

    if config.prepare.replica > 0 {
        if let Some(statement) = dialect.set_replica(table, config.prepare.replica) {
            info!(table, replica = config.prepare.replica, "Requesting replicas");
            conn.execute(&statement).await?;
            report.replica_requested = Some(config.prepare.replica);
        }
    }

    if config.prepare.preload_rows > 0 {
        let mut source = match config.workload.preload_seed() {
            Some(seed) => RandomRowSource::new(seed),
            None => RandomRowSource::from_entropy(),
        };
        let mut accumulator =
            BatchAccumulator::new(conn, dialect.insert_prefix(table), config.workload.batch_size, 0)?;
        report.rows_preloaded =
            preload(&mut accumulator, &mut source, config.prepare.preload_rows).await?;
    }

    info!(
        table,
        statements = report.schema_statements,
        recreated = report.table_recreated,
        preloaded = report.rows_preloaded,
        "Prepare complete"
    );
    Ok(report)
}

/// Execute every `;`-separated statement of `ddl`. Returns the count run.
pub async fn apply_schema(conn: &mut BoxConnection, ddl: &str) -> Result<usize> {
    let mut count = 0;
    for statement in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        debug!("schema: {}", statement);
        conn.execute(statement).await?;
        count += 1;
    }
    Ok(count)
}

/// Drop `table` and create it again with the definition of `like`.
pub async fn recreate_like(
    conn: &mut BoxConnection,
    dialect: &dyn Dialect,
    table: &str,
    like: &str,
) -> Result<()> {
    info!(table, like, "Recreating table");
    conn.execute(&dialect.drop_table_if_exists(table)).await?;
    conn.execute(&dialect.create_table_like(table, like)).await?;
    Ok(())
}

/// Insert `rows` generated rows and flush the remainder.
pub async fn preload(
    accumulator: &mut BatchAccumulator,
    source: &mut dyn RowSource,
    rows: u64,
) -> Result<u64> {
    for _ in 0..rows {
        let row = source.next_row();
        accumulator.insert_value(&row).await?;
    }
    accumulator.flush().await?;
    info!(rows = accumulator.rows_written(), "Preload complete");
    Ok(accumulator.rows_written())
}
