// src/exec/load_dimension.rs

use tracing::info;

use crate::exec::target::resolve_insert_target;
use crate::exec::{require_sql, ExecContext, ExecFuture, Executor, TaskOutput};
use crate::warehouse::WarehouseClient;

/// Load a dimension relation, optionally truncating it first.
///
/// The target is resolved from the `INSERT INTO <name>(...)` statement; a
/// statement it cannot be resolved from fails with
/// [`crate::errors::ExecutorError::TargetNotResolved`] and is never retried.
///
/// Truncate and insert are two separate statements and are NOT atomic. If the
/// process dies between them, the dimension stays empty until the task is
/// retried. This is accepted: every attempt starts over from the truncate, so
/// a retry always rebuilds the full dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadDimension {
    pub sql: String,
    pub truncate: bool,
}

impl LoadDimension {
    pub fn new(sql: impl Into<String>, truncate: bool) -> Self {
        Self {
            sql: sql.into(),
            truncate,
        }
    }
}

impl Executor for LoadDimension {
    fn kind(&self) -> &'static str {
        "load_dimension"
    }

    fn validate(&self) -> Result<(), String> {
        require_sql(&self.sql)
    }

    fn run<'a>(
        &'a self,
        warehouse: &'a dyn WarehouseClient,
        ctx: &'a ExecContext,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            let target = resolve_insert_target(&self.sql)?;
            info!(parent: &ctx.span, target = %target, "loading dimension table");

            let mut statements = 1;
            if self.truncate {
                info!(parent: &ctx.span, target = %target, "truncating dimension table");
                warehouse.execute(&format!("TRUNCATE {target};")).await?;
                statements += 1;
            }

            warehouse.execute(&self.sql).await?;
            info!(parent: &ctx.span, target = %target, statements, "dimension insert complete");
            Ok(TaskOutput::Loaded { target })
        })
    }
}
