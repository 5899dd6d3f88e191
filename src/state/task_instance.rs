// src/state/task_instance.rs

//! Per-run status of a single task.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting on upstream tasks.
    Pending,
    /// Every upstream succeeded; waiting for a free execution slot.
    Queued,
    /// An attempt is in flight.
    Running,
    Success,
    /// Last attempt failed. Terminal unless a retry is scheduled.
    Failed,
    /// Never attempted because an upstream task did not succeed.
    UpstreamFailed,
    /// Never attempted because the run was aborted.
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::UpstreamFailed => "upstream_failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Statuses that prevent every downstream task from ever running.
    pub fn blocks_downstream(self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::UpstreamFailed | TaskStatus::Skipped
        )
    }

    /// Forward-only transition table used by the engine.
    ///
    /// `Failed -> Queued` is the retry edge; callers must also check the
    /// attempt budget. Resets performed by an operator retry bypass this.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, UpstreamFailed)
                | (Pending, Skipped)
                | (Queued, Running)
                | (Queued, Skipped)
                | (Running, Success)
                | (Running, Failed)
                | (Failed, Queued)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A task's state within exactly one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub status: TaskStatus,
    /// Attempts started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    /// Set while a failed instance waits out its retry delay.
    pub retry_scheduled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskInstance {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            retry_scheduled: false,
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether this instance will never change again without operator action.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Success | TaskStatus::UpstreamFailed | TaskStatus::Skipped => true,
            TaskStatus::Failed => !self.retry_scheduled,
            TaskStatus::Pending | TaskStatus::Queued | TaskStatus::Running => false,
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
