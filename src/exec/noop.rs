// src/exec/noop.rs

use tracing::debug;

use crate::exec::{ExecContext, ExecFuture, Executor, TaskOutput};
use crate::warehouse::WarehouseClient;

/// Marker task used as a fan-out / fan-in point (`Begin_execution`,
/// `Loading_complete`, ...). Succeeds without touching the warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Noop;

impl Executor for Noop {
    fn kind(&self) -> &'static str {
        "noop"
    }

    fn run<'a>(
        &'a self,
        _warehouse: &'a dyn WarehouseClient,
        ctx: &'a ExecContext,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            debug!(parent: &ctx.span, "marker task reached");
            Ok(TaskOutput::Marker)
        })
    }
}
