// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::Dag;
use crate::engine::core::EngineCore;
use crate::engine::{CoreStep, EngineCommand, EngineConfig, EngineEvent};
use crate::errors::Result;
use crate::exec::task_runner::{Attempt, spawn_attempt};
use crate::state::{RunState, RunStore};
use crate::warehouse::WarehouseClient;

/// Requests an abort of every run the owning [`Engine`] is executing.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Async shell around [`EngineCore`].
///
/// Attempts run as independent Tokio tasks, so a task blocked on warehouse
/// IO never delays dispatch of unrelated work. Their outcomes, retry timers
/// and abort requests are funnelled through one channel into the core, which
/// serialises every RunState mutation.
pub struct Engine {
    dag: Arc<Dag>,
    config: EngineConfig,
    warehouse: Arc<dyn WarehouseClient>,
    abort: AbortHandle,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("dag", &self.dag.id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(dag: Arc<Dag>, config: EngineConfig, warehouse: Arc<dyn WarehouseClient>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            dag,
            config,
            warehouse,
            abort: AbortHandle { tx: Arc::new(tx) },
        }
    }

    pub fn dag(&self) -> &Arc<Dag> {
        &self.dag
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Create the run for `tick` in `store` and execute it to completion.
    pub async fn run_tick(&self, store: &RunStore, tick: DateTime<Utc>) -> Result<RunState> {
        let run = store.create_run(&self.dag, tick)?;
        self.execute(run, store).await
    }

    /// Drive `run` (new or resumed) until every instance is terminal.
    ///
    /// The run is persisted after every step; a failed intermediate save is
    /// logged and retried on the next step, the final save is reported.
    pub async fn execute(&self, run: RunState, store: &RunStore) -> Result<RunState> {
        let (tx, mut rx) = mpsc::channel::<EngineEvent>(64);
        let mut abort_rx = self.abort.tx.subscribe();
        let mut timers: Vec<JoinHandle<()>> = Vec::new();

        let run_id = run.run_id.clone();
        let mut core = EngineCore::new(self.dag.clone(), run, self.config.max_concurrency);

        if *abort_rx.borrow_and_update() {
            core.step(EngineEvent::AbortRequested);
        }
        let step = core.start();
        persist(store, core.run_state());
        let mut finished = self.apply(step, &run_id, &tx, &mut timers);

        while !finished {
            let event = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                changed = abort_rx.changed(), if !core.run_state().aborted => {
                    match changed {
                        Ok(()) if *abort_rx.borrow_and_update() => EngineEvent::AbortRequested,
                        _ => continue,
                    }
                }
            };

            debug!(run_id = %run_id, ?event, "engine received event");
            let step = core.step(event);
            persist(store, core.run_state());
            finished = self.apply(step, &run_id, &tx, &mut timers);
        }

        for timer in timers {
            timer.abort();
        }

        let run = core.into_run_state();
        store.save(&run)?;
        info!(
            run_id = %run.run_id,
            dag = %run.dag_id,
            status = %run.status(),
            "run finished"
        );
        Ok(run)
    }

    /// Carry out the core's commands. Returns whether the run is finished.
    fn apply(
        &self,
        step: CoreStep,
        run_id: &str,
        tx: &mpsc::Sender<EngineEvent>,
        timers: &mut Vec<JoinHandle<()>>,
    ) -> bool {
        for command in step.commands {
            match command {
                EngineCommand::Dispatch(batch) => {
                    for dispatch in batch {
                        debug!(run_id, task = %dispatch.task, attempt = dispatch.attempt, "dispatching");
                        spawn_attempt(
                            Attempt {
                                dag: self.dag.clone(),
                                warehouse: self.warehouse.clone(),
                                run_id: run_id.to_string(),
                                task: dispatch.task,
                                attempt: dispatch.attempt,
                                default_timeout: self.config.default_timeout,
                            },
                            tx.clone(),
                        );
                    }
                }
                EngineCommand::ScheduleRetry { task, delay } => {
                    let tx = tx.clone();
                    timers.retain(|t| !t.is_finished());
                    timers.push(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(EngineEvent::RetryDue { task }).await;
                    }));
                }
            }
        }
        step.run_finished
    }
}

fn persist(store: &RunStore, run: &RunState) {
    if let Err(err) = store.save(run) {
        warn!(run_id = %run.run_id, error = %err, "failed to persist run state");
    }
}
