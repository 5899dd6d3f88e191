// src/exec/task_runner.rs

//! Runs a single task attempt on its own Tokio task.
//!
//! The attempt future is spawned separately from the task that reports back,
//! so a panicking executor still produces a `TaskFinished` event (as
//! [`ExecutorError::Crashed`]) instead of leaving the engine waiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dag::{Dag, TaskId};
use crate::engine::EngineEvent;
use crate::errors::ExecutorError;
use crate::exec::{ExecContext, TaskOutput};
use crate::warehouse::WarehouseClient;

/// Everything one attempt needs; owned so it can move onto a Tokio task.
#[derive(Clone)]
pub struct Attempt {
    pub dag: Arc<Dag>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub run_id: String,
    pub task: TaskId,
    pub attempt: u32,
    /// Used when the task has no timeout of its own.
    pub default_timeout: Option<Duration>,
}

/// Execute the attempt inline, applying the wall-clock timeout.
pub async fn run_attempt(attempt: Attempt) -> Result<TaskOutput, ExecutorError> {
    let ctx = ExecContext::new(&attempt.run_id, &attempt.task, attempt.attempt);
    let Some(spec) = attempt.dag.task(&attempt.task) else {
        return Err(ExecutorError::Crashed(format!(
            "task '{}' is not part of DAG '{}'",
            attempt.task,
            attempt.dag.id()
        )));
    };

    let executor = spec.kind.executor();
    let limit = spec.timeout.or(attempt.default_timeout);
    info!(parent: &ctx.span, kind = executor.kind(), ?limit, "attempt started");

    let started = Instant::now();
    let fut = executor.run(attempt.warehouse.as_ref(), &ctx);
    let result = match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(limit)),
        },
        None => fut.await,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(output) => info!(parent: &ctx.span, elapsed_ms, ?output, "attempt succeeded"),
        Err(err) => warn!(parent: &ctx.span, elapsed_ms, error = %err, "attempt failed"),
    }
    result
}

/// Spawn the attempt and report its outcome to the engine.
pub fn spawn_attempt(attempt: Attempt, events: mpsc::Sender<EngineEvent>) -> JoinHandle<()> {
    let task = attempt.task.clone();
    let number = attempt.attempt;
    let run_id = attempt.run_id.clone();

    tokio::spawn(async move {
        let result = match tokio::spawn(run_attempt(attempt)).await {
            Ok(result) => result,
            Err(join_err) => {
                error!(
                    run_id = %run_id,
                    task = %task,
                    attempt = number,
                    error = %join_err,
                    "attempt crashed"
                );
                Err(ExecutorError::Crashed(join_err.to_string()))
            }
        };

        let event = EngineEvent::TaskFinished {
            task: task.clone(),
            attempt: number,
            result,
        };
        if events.send(event).await.is_err() {
            debug!(
                run_id = %run_id,
                task = %task,
                "engine stopped before the attempt reported back"
            );
        }
    })
}
