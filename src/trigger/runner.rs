// src/trigger/runner.rs

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::errors::Result;
use crate::state::{RunState, RunStore};
use crate::trigger::queue::{Offer, TickQueue};
use crate::trigger::schedule::CronSchedule;

type Finished = (DateTime<Utc>, Result<RunState>);

/// Fires DAG runs on a cron schedule without catchup.
///
/// Nothing fires at startup: the first run belongs to the first tick after
/// the loop starts. When the loop wakes up late, only the latest due tick
/// runs; older ones are logged and dropped.
#[derive(Debug)]
pub struct Trigger {
    engine: Arc<Engine>,
    store: RunStore,
    schedule: CronSchedule,
}

impl Trigger {
    pub fn new(engine: Arc<Engine>, store: RunStore, schedule: CronSchedule) -> Self {
        Self {
            engine,
            store,
            schedule,
        }
    }

    /// Run until `shutdown` resolves. On shutdown the active run is aborted
    /// (its running attempts finish) and any pending tick is dropped.
    ///
    /// Returns every run that completed while the loop was active.
    pub async fn run_until<F>(self, shutdown: F) -> Result<Vec<RunState>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let (done_tx, mut done_rx) = mpsc::channel::<Finished>(4);
        let mut queue = TickQueue::new();
        let mut completed = Vec::new();
        let mut checked_until = Utc::now();

        info!(
            dag = %self.engine.dag().id(),
            schedule = self.schedule.expression(),
            "trigger loop started"
        );

        loop {
            let Some(next) = self.schedule.next_after(checked_until) else {
                warn!(schedule = self.schedule.expression(), "schedule has no further ticks");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; stopping trigger loop");
                    break;
                }
                Some((tick, result)) = done_rx.recv() => {
                    self.record(tick, result, &mut completed);
                    if let Some(tick) = queue.finish() {
                        self.spawn_run(tick, done_tx.clone());
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    let now = Utc::now();
                    let due = self.schedule.latest_due(checked_until, now);
                    checked_until = now;

                    let Some(due) = due else { continue };
                    if due.skipped > 0 {
                        warn!(
                            tick = %due.tick,
                            skipped = due.skipped,
                            "missed ticks are not backfilled"
                        );
                    }
                    match queue.offer(due.tick) {
                        Offer::Start(tick) => self.spawn_run(tick, done_tx.clone()),
                        Offer::Queued { .. } | Offer::Duplicate => {}
                    }
                }
            }
        }

        if let Some(tick) = queue.drop_pending() {
            info!(%tick, "dropping pending tick on shutdown");
        }
        if queue.in_flight().is_some() {
            self.engine.abort_handle().abort();
            if let Some((tick, result)) = done_rx.recv().await {
                self.record(tick, result, &mut completed);
            }
        }

        Ok(completed)
    }

    fn spawn_run(&self, tick: DateTime<Utc>, done: mpsc::Sender<Finished>) {
        info!(%tick, "tick fired; starting run");
        let engine = self.engine.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let result = engine.run_tick(&store, tick).await;
            let _ = done.send((tick, result)).await;
        });
    }

    fn record(&self, tick: DateTime<Utc>, result: Result<RunState>, completed: &mut Vec<RunState>) {
        match result {
            Ok(run) => {
                info!(%tick, run_id = %run.run_id, status = %run.status(), "scheduled run completed");
                completed.push(run);
            }
            Err(err) => error!(%tick, error = %err, "scheduled run could not be executed"),
        }
    }
}
