// src/exec/mod.rs

//! Task executors.
//!
//! Every [`crate::dag::TaskKind`] wraps one of the structs below, and each of
//! them implements [`Executor`]. Executors are stateless: everything they need
//! arrives through the struct itself (the task's parameters), the
//! [`WarehouseClient`] and the [`ExecContext`]. Running the same executor
//! twice for one task instance must be safe, since the engine retries by
//! simply calling `run` again.
//!
//! - [`noop`]: marker / barrier tasks.
//! - [`create_table`]: idempotent DDL.
//! - [`bulk_load`]: external location into a staging relation.
//! - [`load_fact`]: append-only fact inserts.
//! - [`load_dimension`]: optional truncate, then insert.
//! - [`quality_check`]: aggregate check evaluated by [`crate::quality`].
//! - [`task_runner`]: runs one attempt on a Tokio task and reports back to
//!   the engine.

pub mod bulk_load;
pub mod create_table;
pub mod load_dimension;
pub mod load_fact;
pub mod noop;
pub mod quality_check;
pub mod target;
pub mod task_runner;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::{info_span, Span};

use crate::dag::TaskId;
use crate::errors::ExecutorError;
use crate::warehouse::WarehouseClient;

pub use bulk_load::BulkLoad;
pub use create_table::CreateTable;
pub use load_dimension::LoadDimension;
pub use load_fact::LoadFact;
pub use noop::Noop;
pub use quality_check::DataQualityCheck;

/// Per-attempt context handed to an executor.
///
/// `span` is the structured-event sink for the attempt: executors emit their
/// events with `parent: &ctx.span` so every line carries run, task and attempt.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub run_id: String,
    pub task_id: TaskId,
    /// 1-based attempt number.
    pub attempt: u32,
    pub span: Span,
}

impl ExecContext {
    pub fn new(run_id: impl Into<String>, task_id: impl Into<TaskId>, attempt: u32) -> Self {
        let run_id = run_id.into();
        let task_id = task_id.into();
        let span = info_span!("task", run_id = %run_id, task = %task_id, attempt);
        Self {
            run_id,
            task_id,
            attempt,
            span,
        }
    }
}

/// What a successful attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// Marker task; nothing was executed.
    Marker,
    /// Statements ran without producing anything of interest.
    Executed { statements: usize },
    /// Data landed in `target`.
    Loaded { target: String },
    /// Quality check passed over this many counters.
    QualityPassed { columns: usize },
}

pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<TaskOutput, ExecutorError>> + Send + 'a>>;

/// Polymorphic unit of work.
pub trait Executor: fmt::Debug + Send + Sync {
    /// Short kind tag, as used in DAG definitions.
    fn kind(&self) -> &'static str;

    /// Static parameter checks, run once at DAG construction.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn run<'a>(&'a self, warehouse: &'a dyn WarehouseClient, ctx: &'a ExecContext)
    -> ExecFuture<'a>;
}

pub(crate) fn require_sql(sql: &str) -> Result<(), String> {
    if sql.trim().is_empty() {
        Err("sql must not be empty".to_string())
    } else {
        Ok(())
    }
}
