// src/engine/core.rs

//! Pure engine state machine.
//!
//! [`EngineCore`] owns the [`RunState`] of one run and is its single writer.
//! It never touches Tokio, channels or the warehouse: it turns
//! [`EngineEvent`]s into state transitions plus [`EngineCommand`]s for the
//! shell. Readiness is recomputed incrementally, only for the direct
//! dependents of a task that just succeeded.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::dag::{Dag, TaskId};
use crate::engine::{CoreStep, Dispatch, EngineCommand, EngineEvent};
use crate::errors::ExecutorError;
use crate::exec::TaskOutput;
use crate::state::{RunState, TaskStatus};

#[derive(Debug)]
pub struct EngineCore {
    dag: Arc<Dag>,
    run: RunState,
    max_concurrency: usize,
    /// Queued tasks waiting for a free slot, FIFO.
    queue: VecDeque<TaskId>,
    /// Tasks with an attempt in flight.
    running: BTreeSet<TaskId>,
}

impl EngineCore {
    pub fn new(dag: Arc<Dag>, run: RunState, max_concurrency: usize) -> Self {
        Self {
            dag,
            run,
            max_concurrency: max_concurrency.max(1),
            queue: VecDeque::new(),
            running: BTreeSet::new(),
        }
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn into_run_state(self) -> RunState {
        self.run
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn is_finished(&self) -> bool {
        self.running.is_empty() && self.run.is_finished()
    }

    /// Seed a new or resumed run.
    ///
    /// Interrupted instances of a resumed run are re-queued first. Then a
    /// single pass in topological order queues every Pending task whose
    /// upstream all succeeded and marks UpstreamFailed every Pending task
    /// behind a terminal failure.
    pub fn start(&mut self) -> CoreStep {
        let requeued = self.run.requeue_interrupted(&self.dag);
        self.queue.extend(requeued);

        if self.run.aborted {
            // Stopped mid-abort: finish the abort instead of dispatching.
            self.run.abort();
            self.queue.clear();
        } else {
            let order = self.dag.topological_order().to_vec();
            for id in order {
                if self.run.status_of(&id) != Some(TaskStatus::Pending) {
                    continue;
                }
                if self.run.upstream_blocked(&self.dag, &id) {
                    self.run.transition(&id, TaskStatus::UpstreamFailed);
                } else if self.run.upstream_satisfied(&self.dag, &id) {
                    self.enqueue(&id);
                }
            }
        }

        info!(
            run_id = %self.run.run_id,
            dag = %self.run.dag_id,
            queued = self.queue.len(),
            "run started"
        );
        self.finish_step(Vec::new())
    }

    /// Handle one event and return what the shell should do next.
    pub fn step(&mut self, event: EngineEvent) -> CoreStep {
        let mut commands = Vec::new();

        match event {
            EngineEvent::TaskFinished {
                task,
                attempt,
                result,
            } => {
                if !self.accept_completion(&task, attempt) {
                    return self.finish_step(commands);
                }
                match result {
                    Ok(output) => self.on_success(&task, output),
                    Err(err) => {
                        if let Some(cmd) = self.on_failure(&task, attempt, err) {
                            commands.push(cmd);
                        }
                    }
                }
            }
            EngineEvent::RetryDue { task } => self.on_retry_due(&task),
            EngineEvent::AbortRequested => self.on_abort(),
        }

        self.finish_step(commands)
    }

    fn accept_completion(&mut self, task: &str, attempt: u32) -> bool {
        let current = self.run.instance(task).map(|inst| inst.attempts);
        if !self.running.contains(task) || current != Some(attempt) {
            warn!(
                run_id = %self.run.run_id,
                task,
                attempt,
                "ignoring completion of an attempt that is not in flight"
            );
            return false;
        }
        self.running.remove(task);
        true
    }

    fn on_success(&mut self, task: &str, output: TaskOutput) {
        debug!(run_id = %self.run.run_id, task, ?output, "attempt succeeded");
        self.run.transition(task, TaskStatus::Success);

        if self.run.aborted {
            return;
        }

        let dependents = self.dag.dependents_of(task).to_vec();
        for dep in dependents {
            if self.run.status_of(&dep) == Some(TaskStatus::Pending)
                && self.run.upstream_satisfied(&self.dag, &dep)
            {
                self.enqueue(&dep);
            }
        }
    }

    fn on_failure(&mut self, task: &str, attempt: u32, err: ExecutorError) -> Option<EngineCommand> {
        self.run.record_error(task, err.to_string());
        self.run.transition(task, TaskStatus::Failed);

        let spec = self.dag.task(task)?;
        let attempts_left = self
            .run
            .instance(task)
            .is_some_and(|inst| inst.has_attempts_left());
        let retryable = spec.allows_retry(&err);

        if attempts_left && retryable && !self.run.aborted {
            let delay = spec.retry.delay_after(attempt);
            self.run.set_retry_scheduled(task, true);
            warn!(
                run_id = %self.run.run_id,
                task,
                attempt,
                max_attempts = spec.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed; retry scheduled"
            );
            return Some(EngineCommand::ScheduleRetry {
                task: task.to_string(),
                delay,
            });
        }

        let reason = if self.run.aborted {
            "run aborted"
        } else if !retryable {
            "error is not retryable"
        } else {
            "attempts exhausted"
        };
        error!(
            run_id = %self.run.run_id,
            task,
            attempt,
            error = %err,
            reason,
            "task failed"
        );

        let blocked = self.run.propagate_upstream_failed(&self.dag, task);
        if !blocked.is_empty() {
            warn!(
                run_id = %self.run.run_id,
                task,
                downstream = ?blocked,
                "downstream tasks will not run"
            );
        }
        None
    }

    fn on_retry_due(&mut self, task: &str) {
        let waiting = self
            .run
            .instance(task)
            .is_some_and(|inst| inst.status == TaskStatus::Failed && inst.retry_scheduled);

        if !waiting || self.run.aborted {
            debug!(run_id = %self.run.run_id, task, "stale retry timer ignored");
            return;
        }
        self.enqueue(task);
    }

    fn on_abort(&mut self) {
        if self.run.aborted {
            return;
        }
        let skipped = self.run.abort();
        self.queue.clear();
        info!(
            run_id = %self.run.run_id,
            skipped = skipped.len(),
            in_flight = self.running.len(),
            "run aborted; in-flight attempts will finish"
        );
    }

    fn enqueue(&mut self, task: &str) {
        if self.run.transition(task, TaskStatus::Queued) {
            self.queue.push_back(task.to_string());
        }
    }

    /// Move queued tasks to Running while slots are free.
    fn fill_slots(&mut self) -> Vec<Dispatch> {
        let mut batch = Vec::new();

        while self.running.len() < self.max_concurrency {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            if self.run.status_of(&task) != Some(TaskStatus::Queued) {
                continue;
            }
            if !self.run.transition(&task, TaskStatus::Running) {
                continue;
            }
            let attempt = self.run.instance(&task).map_or(1, |inst| inst.attempts);
            self.running.insert(task.clone());
            batch.push(Dispatch { task, attempt });
        }

        batch
    }

    fn finish_step(&mut self, mut commands: Vec<EngineCommand>) -> CoreStep {
        if !self.run.aborted {
            let batch = self.fill_slots();
            if !batch.is_empty() {
                commands.push(EngineCommand::Dispatch(batch));
            }
        }

        let run_finished = self.is_finished();
        if run_finished {
            self.run.finish();
        }

        CoreStep {
            commands,
            run_finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use crate::dag::{RetryPolicy, TaskSpec};
    use crate::errors::WarehouseError;
    use crate::state::RunStatus;

    fn core(tasks: Vec<TaskSpec>, max_concurrency: usize) -> EngineCore {
        let dag = Arc::new(Dag::build("core", tasks, vec![]).unwrap());
        let tick = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let run = RunState::new(&dag, tick);
        EngineCore::new(dag, run, max_concurrency)
    }

    fn names(step: &CoreStep) -> Vec<String> {
        let mut v: Vec<String> = step.dispatched().map(|d| d.task.clone()).collect();
        v.sort();
        v
    }

    fn ok(task: &str, attempt: u32) -> EngineEvent {
        EngineEvent::TaskFinished {
            task: task.into(),
            attempt,
            result: Ok(TaskOutput::Marker),
        }
    }

    fn fail(task: &str, attempt: u32) -> EngineEvent {
        EngineEvent::TaskFinished {
            task: task.into(),
            attempt,
            result: Err(WarehouseError::Statement("boom".into()).into()),
        }
    }

    #[test]
    fn diamond_dispatches_in_dependency_order() {
        let mut c = core(
            vec![
                TaskSpec::noop("A"),
                TaskSpec::noop("B").after(["A"]),
                TaskSpec::noop("C").after(["A"]),
                TaskSpec::noop("D").after(["B", "C"]),
            ],
            4,
        );

        assert_eq!(names(&c.start()), vec!["A"]);
        assert_eq!(names(&c.step(ok("A", 1))), vec!["B", "C"]);
        // AND-join waits for both branches.
        assert!(names(&c.step(ok("B", 1))).is_empty());
        assert_eq!(names(&c.step(ok("C", 1))), vec!["D"]);
        let last = c.step(ok("D", 1));
        assert!(last.run_finished);
        assert_eq!(c.run_state().status(), RunStatus::Success);
    }

    #[test]
    fn failure_schedules_retry_then_requeues() {
        let mut c = core(
            vec![TaskSpec::noop("A").retry(RetryPolicy::fixed(2, Duration::from_secs(7)))],
            1,
        );
        c.start();

        let step = c.step(fail("A", 1));
        assert_eq!(
            step.commands,
            vec![EngineCommand::ScheduleRetry {
                task: "A".into(),
                delay: Duration::from_secs(7)
            }]
        );
        assert!(!step.run_finished);

        let step = c.step(EngineEvent::RetryDue { task: "A".into() });
        assert_eq!(
            step.dispatched().cloned().collect::<Vec<_>>(),
            vec![Dispatch {
                task: "A".into(),
                attempt: 2
            }]
        );

        let step = c.step(fail("A", 2));
        assert!(step.commands.is_empty());
        assert!(step.run_finished);
        assert_eq!(c.run_state().status_of("A"), Some(TaskStatus::Failed));
    }

    #[test]
    fn terminal_failure_blocks_join_and_descendants() {
        let mut c = core(
            vec![
                TaskSpec::noop("A"),
                TaskSpec::noop("B").after(["A"]),
                TaskSpec::noop("C").after(["A"]).retry(RetryPolicy::none()),
                TaskSpec::noop("D").after(["B", "C"]),
                TaskSpec::noop("E").after(["D"]),
            ],
            4,
        );
        c.start();
        c.step(ok("A", 1));
        c.step(fail("C", 1));

        assert_eq!(c.run_state().status_of("D"), Some(TaskStatus::UpstreamFailed));
        assert_eq!(c.run_state().status_of("E"), Some(TaskStatus::UpstreamFailed));
        assert!(!c.is_finished());

        let step = c.step(ok("B", 1));
        assert!(step.dispatched().next().is_none());
        assert!(step.run_finished);
        assert_eq!(c.run_state().status_of("B"), Some(TaskStatus::Success));
        assert_eq!(c.run_state().status(), RunStatus::Failed);
    }

    #[test]
    fn quality_failure_is_terminal_by_default() {
        let mut c = core(vec![TaskSpec::noop("Q")], 1);
        c.start();
        let step = c.step(EngineEvent::TaskFinished {
            task: "Q".into(),
            attempt: 1,
            result: Err(ExecutorError::NoRows),
        });
        assert!(step.run_finished);
        assert_eq!(c.run_state().instance("Q").unwrap().attempts, 1);
    }

    #[test]
    fn concurrency_limit_holds_back_ready_tasks() {
        let tasks = (0..5).map(|i| TaskSpec::noop(format!("T{i}"))).collect();
        let mut c = core(tasks, 2);

        let first = names(&c.start());
        assert_eq!(first.len(), 2);
        assert_eq!(c.running(), 2);

        let step = c.step(ok(&first[0], 1));
        assert_eq!(step.dispatched().count(), 1);
        assert_eq!(c.running(), 2);
    }

    #[test]
    fn abort_skips_queued_and_lets_running_finish() {
        let tasks = vec![
            TaskSpec::noop("A"),
            TaskSpec::noop("B"),
            TaskSpec::noop("C").after(["A", "B"]),
        ];
        let mut c = core(tasks, 1);
        let started = names(&c.start());
        assert_eq!(started.len(), 1);
        let running = started[0].clone();
        let queued = if running == "A" { "B" } else { "A" };
        assert_eq!(c.run_state().status_of(queued), Some(TaskStatus::Queued));

        let step = c.step(EngineEvent::AbortRequested);
        assert!(step.dispatched().next().is_none());
        assert_eq!(c.run_state().status_of(queued), Some(TaskStatus::Skipped));
        assert_eq!(c.run_state().status_of("C"), Some(TaskStatus::Skipped));
        assert!(!step.run_finished);

        let step = c.step(ok(&running, 1));
        assert!(step.run_finished);
        assert_eq!(c.run_state().status_of(&running), Some(TaskStatus::Success));
        assert_eq!(c.run_state().status(), RunStatus::Aborted);
    }

    #[test]
    fn abort_cancels_pending_retry() {
        let mut c = core(vec![TaskSpec::noop("A")], 1);
        c.start();
        c.step(fail("A", 1));
        let step = c.step(EngineEvent::AbortRequested);
        assert!(step.run_finished);

        let step = c.step(EngineEvent::RetryDue { task: "A".into() });
        assert!(step.dispatched().next().is_none());
        assert_eq!(c.run_state().status(), RunStatus::Failed);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut c = core(vec![TaskSpec::noop("A")], 1);
        c.start();
        let step = c.step(ok("A", 7));
        assert!(!step.run_finished);
        assert_eq!(c.run_state().status_of("A"), Some(TaskStatus::Running));
    }

    #[test]
    fn resumed_run_continues_after_operator_retry() {
        let dag = Arc::new(
            Dag::build(
                "resume",
                vec![
                    TaskSpec::noop("A").retry(RetryPolicy::none()),
                    TaskSpec::noop("B").after(["A"]),
                ],
                vec![],
            )
            .unwrap(),
        );
        let tick = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut c = EngineCore::new(dag.clone(), RunState::new(&dag, tick), 2);
        c.start();
        c.step(fail("A", 1));
        let mut run = c.into_run_state();
        assert_eq!(run.status(), RunStatus::Failed);

        run.mark_for_retry(&dag, "A").unwrap();
        let mut c = EngineCore::new(dag, run, 2);
        assert_eq!(names(&c.start()), vec!["A"]);
        assert_eq!(names(&c.step(ok("A", 1))), vec!["B"]);
        assert!(c.step(ok("B", 1)).run_finished);
        assert_eq!(c.run_state().status(), RunStatus::Success);
    }
}
