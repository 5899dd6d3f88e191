// src/errors.rs

//! Crate-wide error types.
//!
//! Each concern gets its own `thiserror` enum so callers can match on the
//! kind that matters to them (the engine cares about [`ExecutorError`], the
//! CLI mostly about [`EtlError`]).

use std::time::Duration;

use thiserror::Error;

/// Errors raised while constructing a [`crate::dag::Dag`].
///
/// Construction is all-or-nothing: any of these aborts before a run exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("DAG must contain at least one task")]
    EmptyDag,

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("edge references unknown task '{0}'")]
    UnknownTask(String),

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("cycle detected in task DAG involving task '{0}'")]
    Cycle(String),

    #[error("task '{task}' has an invalid parameter: {reason}")]
    InvalidParameter { task: String, reason: String },
}

/// Failures reported by a [`crate::warehouse::WarehouseClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    #[error("warehouse connection error: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("load source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("load into '{target}' rejected: {reason}")]
    LoadRejected { target: String, reason: String },
}

/// Why a single task attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("data quality check failed: column '{column}' reported {value}")]
    DataQuality { column: String, value: String },

    #[error("data quality check returned no rows")]
    NoRows,

    #[error("could not resolve target relation from statement: {0}")]
    TargetNotResolved(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("executor crashed: {0}")]
    Crashed(String),
}

impl ExecutorError {
    /// Whether the failed attempt may have committed work before reporting
    /// the error (the client cannot tell a lost ack from a lost statement).
    pub fn is_ambiguous_commit(&self) -> bool {
        matches!(
            self,
            ExecutorError::Timeout(_)
                | ExecutorError::Crashed(_)
                | ExecutorError::Warehouse(WarehouseError::Connection(_))
        )
    }

    /// Failures caused by the data itself rather than by infrastructure.
    pub fn is_quality_failure(&self) -> bool {
        matches!(
            self,
            ExecutorError::DataQuality { .. } | ExecutorError::NoRows
        )
    }
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DAG validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Run store error: {0}")]
    Store(String),

    #[error("cannot retry task '{task}': {reason}")]
    RetryRejected { task: String, reason: String },

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EtlError>;
