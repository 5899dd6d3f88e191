// src/state/run_state.rs

//! State of one DAG run.
//!
//! A [`RunState`] is created per `(DAG, tick)` and is only mutated by the
//! engine (and by an operator retry between runs). Every status change goes
//! through [`RunState::transition`], which enforces the forward-only table in
//! [`TaskStatus::can_transition_to`], emits one structured event and bumps
//! the `(task, status)` counter.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dag::{Dag, TaskId};
use crate::errors::{EtlError, Result};
use crate::state::counters::TransitionCounters;
use crate::state::task_instance::{TaskInstance, TaskStatus};

/// Aggregate status of a run; the worst outcome among its tasks wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    /// At least one task ended Failed or UpstreamFailed.
    Failed,
    /// Nothing failed, but some tasks were skipped by an abort.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub dag_id: String,
    /// Schedule tick this run belongs to.
    pub tick: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub aborted: bool,
    instances: BTreeMap<TaskId, TaskInstance>,
    counters: TransitionCounters,
}

/// Run identifier derived from the tick, e.g. `scheduled__20240101T120000Z`.
pub fn run_id_for(tick: DateTime<Utc>) -> String {
    format!("scheduled__{}", tick.format("%Y%m%dT%H%M%SZ"))
}

impl RunState {
    /// Fresh run with every task Pending.
    pub fn new(dag: &Dag, tick: DateTime<Utc>) -> Self {
        let instances = dag
            .tasks()
            .map(|spec| (spec.id.clone(), TaskInstance::new(spec.retry.max_attempts)))
            .collect();

        Self {
            run_id: run_id_for(tick),
            dag_id: dag.id().to_string(),
            tick,
            created_at: Utc::now(),
            finished_at: None,
            aborted: false,
            instances,
            counters: TransitionCounters::default(),
        }
    }

    pub fn instance(&self, task: &str) -> Option<&TaskInstance> {
        self.instances.get(task)
    }

    pub fn instances(&self) -> impl Iterator<Item = (&str, &TaskInstance)> {
        self.instances.iter().map(|(id, inst)| (id.as_str(), inst))
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.instances.get(task).map(|inst| inst.status)
    }

    pub fn counters(&self) -> &TransitionCounters {
        &self.counters
    }

    /// Apply a forward transition. Returns `false` (and changes nothing) when
    /// the transition is not allowed from the current status.
    pub fn transition(&mut self, task: &str, to: TaskStatus) -> bool {
        let Some(inst) = self.instances.get_mut(task) else {
            warn!(run_id = %self.run_id, task, "transition for unknown task ignored");
            return false;
        };

        let from = inst.status;
        if !from.can_transition_to(to) {
            warn!(
                run_id = %self.run_id,
                task,
                %from,
                %to,
                "illegal task transition ignored"
            );
            return false;
        }

        let now = Utc::now();
        match to {
            TaskStatus::Running => {
                inst.attempts += 1;
                inst.started_at = Some(now);
                inst.finished_at = None;
            }
            TaskStatus::Queued => inst.retry_scheduled = false,
            TaskStatus::Success => {
                inst.last_error = None;
                inst.finished_at = Some(now);
            }
            TaskStatus::Failed | TaskStatus::UpstreamFailed | TaskStatus::Skipped => {
                inst.finished_at = Some(now);
            }
            TaskStatus::Pending => {}
        }
        inst.status = to;

        info!(
            run_id = %self.run_id,
            task,
            %from,
            %to,
            attempt = inst.attempts,
            "task state transition"
        );
        self.counters.record(task, to);
        true
    }

    pub fn record_error(&mut self, task: &str, error: impl Into<String>) {
        if let Some(inst) = self.instances.get_mut(task) {
            inst.last_error = Some(error.into());
        }
    }

    pub fn set_retry_scheduled(&mut self, task: &str, scheduled: bool) {
        if let Some(inst) = self.instances.get_mut(task) {
            inst.retry_scheduled = scheduled;
        }
    }

    /// Every upstream of `task` is Success.
    pub fn upstream_satisfied(&self, dag: &Dag, task: &str) -> bool {
        dag.dependencies_of(task)
            .all(|dep| self.status_of(dep) == Some(TaskStatus::Success))
    }

    /// Some upstream of `task` reached a terminal status that can never
    /// become Success within this run.
    pub fn upstream_blocked(&self, dag: &Dag, task: &str) -> bool {
        dag.dependencies_of(task).any(|dep| {
            self.instances
                .get(dep)
                .is_some_and(|inst| inst.is_terminal() && inst.status.blocks_downstream())
        })
    }

    /// Mark every Pending direct or transitive dependent of `root` as
    /// UpstreamFailed. Returns the tasks that changed.
    pub fn propagate_upstream_failed(&mut self, dag: &Dag, root: &str) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = dag.dependents_of(root).to_vec();
        let mut changed = Vec::new();

        while let Some(name) = stack.pop() {
            if self.status_of(&name) != Some(TaskStatus::Pending) {
                // Already terminal, or visited through another path.
                continue;
            }
            self.transition(&name, TaskStatus::UpstreamFailed);
            stack.extend(dag.dependents_of(&name).iter().cloned());
            changed.push(name);
        }

        if !changed.is_empty() {
            debug!(run_id = %self.run_id, root, count = changed.len(), "propagated upstream failure");
        }
        changed
    }

    /// Skip all Pending and Queued tasks and cancel scheduled retries.
    /// Running tasks are left alone; they finish their current attempt.
    pub fn abort(&mut self) -> Vec<TaskId> {
        self.aborted = true;

        let to_skip: Vec<TaskId> = self
            .instances
            .iter()
            .filter(|(_, inst)| matches!(inst.status, TaskStatus::Pending | TaskStatus::Queued))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &to_skip {
            self.transition(id, TaskStatus::Skipped);
        }

        for (id, inst) in self.instances.iter_mut() {
            if inst.status == TaskStatus::Failed && inst.retry_scheduled {
                inst.retry_scheduled = false;
                info!(run_id = %self.run_id, task = %id, "scheduled retry cancelled by abort");
            }
        }

        to_skip
    }

    /// Every instance is terminal.
    pub fn is_finished(&self) -> bool {
        self.instances.values().all(TaskInstance::is_terminal)
    }

    pub fn status(&self) -> RunStatus {
        if !self.is_finished() {
            return RunStatus::Running;
        }

        let any = |s: TaskStatus| self.instances.values().any(|inst| inst.status == s);
        if any(TaskStatus::Failed) || any(TaskStatus::UpstreamFailed) {
            RunStatus::Failed
        } else if self.aborted || any(TaskStatus::Skipped) {
            RunStatus::Aborted
        } else {
            RunStatus::Success
        }
    }

    /// Stamp `finished_at` once the run is finished.
    pub fn finish(&mut self) {
        if self.is_finished() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Operator retry: put `task` back to Pending with a fresh attempt
    /// budget, together with every transitive dependent that never ran
    /// because of it (UpstreamFailed or Skipped).
    ///
    /// This is the only way a terminal instance is resurrected. Returns the
    /// tasks that were reset, `task` first.
    pub fn mark_for_retry(&mut self, dag: &Dag, task: &str) -> Result<Vec<TaskId>> {
        let rejected = |reason: &str| EtlError::RetryRejected {
            task: task.to_string(),
            reason: reason.to_string(),
        };

        let inst = self
            .instances
            .get(task)
            .ok_or_else(|| rejected("no such task in this run"))?;

        if !matches!(
            inst.status,
            TaskStatus::Failed | TaskStatus::UpstreamFailed | TaskStatus::Skipped
        ) {
            return Err(rejected(&format!("task is {}", inst.status)));
        }
        if !inst.is_terminal() {
            return Err(rejected("an automatic retry is already scheduled"));
        }

        let mut reset = vec![task.to_string()];
        reset.extend(dag.descendants_of(task).into_iter().filter(|id| {
            matches!(
                self.status_of(id),
                Some(TaskStatus::UpstreamFailed | TaskStatus::Skipped)
            )
        }));

        for id in &reset {
            self.reset_to_pending(id);
        }

        self.aborted = false;
        self.finished_at = None;
        Ok(reset)
    }

    fn reset_to_pending(&mut self, task: &str) {
        let Some(inst) = self.instances.get_mut(task) else {
            return;
        };
        let from = inst.status;
        let max_attempts = inst.max_attempts;
        *inst = TaskInstance::new(max_attempts);

        info!(
            run_id = %self.run_id,
            task,
            %from,
            to = %TaskStatus::Pending,
            attempt = 0,
            "task reset for operator retry"
        );
        self.counters.record(task, TaskStatus::Pending);
    }

    /// Prepare a persisted run for resumption after the process stopped.
    ///
    /// Instances caught Running lose the interrupted attempt (its outcome was
    /// never recorded) and are re-queued; Queued stays Queued; a Failed
    /// instance waiting for a retry is re-queued right away. Returns the
    /// tasks that need dispatching, in the DAG's topological order.
    pub fn requeue_interrupted(&mut self, dag: &Dag) -> Vec<TaskId> {
        let mut requeued = Vec::new();

        for id in dag.topological_order() {
            let Some(inst) = self.instances.get_mut(id) else {
                continue;
            };
            match inst.status {
                TaskStatus::Running => {
                    inst.attempts = inst.attempts.saturating_sub(1);
                    inst.status = TaskStatus::Queued;
                    warn!(
                        run_id = %self.run_id,
                        task = %id,
                        "attempt interrupted by shutdown; re-queued"
                    );
                    self.counters.record(id, TaskStatus::Queued);
                    requeued.push(id.clone());
                }
                TaskStatus::Queued => requeued.push(id.clone()),
                TaskStatus::Failed if inst.retry_scheduled => {
                    self.transition(id, TaskStatus::Queued);
                    requeued.push(id.clone());
                }
                _ => {}
            }
        }

        requeued
    }
}
