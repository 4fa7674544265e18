//! Configuration validation.

use super::{Config, MutationMode};
use crate::error::{HarnessError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    if config.target.host.is_empty() {
        return Err(HarnessError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(HarnessError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(HarnessError::Config("target.user is required".into()));
    }

    // Workload validation
    let workload = &config.workload;
    if workload.table.is_empty() {
        return Err(HarnessError::Config("workload.table is required".into()));
    }
    if workload.batch_size == 0 {
        return Err(HarnessError::Config(
            "workload.batch_size must be at least 1".into(),
        ));
    }
    if workload.mutation != MutationMode::None {
        if let Some(0) = workload.writers {
            return Err(HarnessError::Config(format!(
                "workload.writers must be at least 1 for mutation mode '{}'",
                workload.mutation
            )));
        }
    }
    if let Some(0) = workload.rows_per_writer {
        return Err(HarnessError::Config(
            "workload.rows_per_writer must be at least 1 when set".into(),
        ));
    }
    if workload.mutation == MutationMode::None && workload.verifiers == Some(0) {
        return Err(HarnessError::Config(
            "nothing to run: no mutation workers and workload.verifiers is 0".into(),
        ));
    }

    // Churn validation
    if workload.mutation == MutationMode::Churn
        && config.churn.max_insert == 0
        && config.churn.max_delete == 0
    {
        return Err(HarnessError::Config(
            "churn.max_insert and churn.max_delete cannot both be 0".into(),
        ));
    }

    // Prepare validation
    if config.prepare.schema_file.is_some() && config.prepare.replica == 0 {
        return Err(HarnessError::Config(
            "prepare.replica must be at least 1 when a schema file is given".into(),
        ));
    }
    if let Some(like) = &config.prepare.like_table {
        if like == &workload.table {
            return Err(HarnessError::Config(
                "prepare.like_table must differ from workload.table".into(),
            ));
        }
    }

    Ok(())
}
