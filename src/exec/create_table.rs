// src/exec/create_table.rs

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::exec::{require_sql, ExecContext, ExecFuture, Executor, TaskOutput};
use crate::warehouse::WarehouseClient;

static IF_NOT_EXISTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCREATE\s+TABLE\s+IF\s+NOT\s+EXISTS\b")
        .expect("create table pattern is valid")
});

/// Idempotent DDL: the statement must be a `CREATE TABLE IF NOT EXISTS`, so
/// re-running it after a success is a no-op on the warehouse side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub sql: String,
}

impl CreateTable {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl Executor for CreateTable {
    fn kind(&self) -> &'static str {
        "create_table"
    }

    fn validate(&self) -> Result<(), String> {
        require_sql(&self.sql)?;
        if !IF_NOT_EXISTS.is_match(&self.sql) {
            return Err("create_table sql must use CREATE TABLE IF NOT EXISTS".to_string());
        }
        Ok(())
    }

    fn run<'a>(
        &'a self,
        warehouse: &'a dyn WarehouseClient,
        ctx: &'a ExecContext,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            info!(parent: &ctx.span, "creating table if missing");
            warehouse.execute(&self.sql).await?;
            Ok(TaskOutput::Executed { statements: 1 })
        })
    }
}
