// src/engine/mod.rs

//! Orchestration engine.
//!
//! The pure state machine lives in [`core`]: it consumes [`EngineEvent`]s,
//! mutates the [`crate::state::RunState`] it owns and returns
//! [`EngineCommand`]s. The async shell in [`runtime`] feeds it events from
//! finished attempts, retry timers and abort requests, and carries out the
//! commands (spawning attempts, arming timers, persisting the run).

use std::time::Duration;

use crate::dag::TaskId;
use crate::errors::ExecutorError;
use crate::exec::TaskOutput;

pub mod core;
pub mod runtime;

pub use core::EngineCore;
pub use runtime::{AbortHandle, Engine};

/// Explicit engine configuration; there is no process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on attempts in flight at once. Never below 1.
    pub max_concurrency: usize,
    /// Per-attempt wall-clock limit for tasks without their own timeout.
    pub default_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            default_timeout: None,
        }
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Events flowing into the core.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An attempt reported its outcome.
    TaskFinished {
        task: TaskId,
        attempt: u32,
        result: Result<TaskOutput, ExecutorError>,
    },
    /// The retry delay of a failed task elapsed.
    RetryDue { task: TaskId },
    /// Operator or shutdown abort.
    AbortRequested,
}

/// One attempt the shell should start now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task: TaskId,
    pub attempt: u32,
}

/// Command produced by the core, executed by the async shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Dispatch(Vec<Dispatch>),
    /// Send [`EngineEvent::RetryDue`] for `task` after `delay`.
    ScheduleRetry { task: TaskId, delay: Duration },
}

/// Result of feeding one event into the core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<EngineCommand>,
    /// Every task instance is terminal and nothing is in flight.
    pub run_finished: bool,
}

impl CoreStep {
    /// Tasks dispatched by this step, in dispatch order.
    pub fn dispatched(&self) -> impl Iterator<Item = &Dispatch> {
        self.commands.iter().flat_map(|c| match c {
            EngineCommand::Dispatch(batch) => batch.as_slice(),
            EngineCommand::ScheduleRetry { .. } => &[],
        })
    }
}
