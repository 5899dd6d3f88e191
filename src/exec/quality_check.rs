// src/exec/quality_check.rs

use tracing::{info, warn};

use crate::exec::{require_sql, ExecContext, ExecFuture, Executor, TaskOutput};
use crate::quality::{evaluate, Verdict};
use crate::warehouse::WarehouseClient;

/// Run an aggregate check statement and judge its single row of counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityCheck {
    pub sql: String,
}

impl DataQualityCheck {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl Executor for DataQualityCheck {
    fn kind(&self) -> &'static str {
        "data_quality_check"
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
            info!(parent: &ctx.span, "starting data quality check");
            let rows = warehouse.execute(&self.sql).await?;

            match evaluate(&rows) {
                Verdict::Pass { columns } => {
                    info!(parent: &ctx.span, columns, "data quality check passed");
                    Ok(TaskOutput::QualityPassed { columns })
                }
                Verdict::Fail(failure) => {
                    warn!(parent: &ctx.span, ?failure, "data quality check failed");
                    Err(failure.into())
                }
            }
        })
    }
}
