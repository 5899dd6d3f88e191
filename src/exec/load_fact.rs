// src/exec/load_fact.rs

use tracing::{info, warn};

use crate::exec::target::resolve_insert_target;
use crate::exec::{require_sql, ExecContext, ExecFuture, Executor, TaskOutput};
use crate::warehouse::WarehouseClient;

/// Append transformed rows into a fact relation from staged data.
///
/// Never truncates. The statement is an `INSERT ... SELECT`, so a failed
/// attempt leaves prior fact rows untouched. `SELECT DISTINCT` only removes
/// duplicates within one execution: if an attempt commits but its
/// acknowledgement is lost, repeating it appends the same rows again. Unless
/// `retry_safe` is set (the analyst's query deduplicates against the target),
/// the engine therefore refuses to auto-retry such ambiguous failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFact {
    pub sql: String,
    pub retry_safe: bool,
}

impl LoadFact {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            retry_safe: false,
        }
    }

    pub fn retry_safe(mut self, retry_safe: bool) -> Self {
        self.retry_safe = retry_safe;
        self
    }
}

impl Executor for LoadFact {
    fn kind(&self) -> &'static str {
        "load_fact"
    }

    fn validate(&self) -> Result<(), String> {
        require_sql(&self.sql)?;
        resolve_insert_target(&self.sql)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn run<'a>(
        &'a self,
        warehouse: &'a dyn WarehouseClient,
        ctx: &'a ExecContext,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            let target = resolve_insert_target(&self.sql)?;
            if ctx.attempt > 1 && self.retry_safe {
                warn!(
                    parent: &ctx.span,
                    target = %target,
                    "re-running fact insert; rows committed by an earlier attempt may be appended twice"
                );
            }

            info!(parent: &ctx.span, target = %target, "appending to fact table");
            warehouse.execute(&self.sql).await?;
            Ok(TaskOutput::Loaded { target })
        })
    }
}
