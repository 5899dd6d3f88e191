// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod quality;
pub mod state;
pub mod trigger;
pub mod warehouse;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{DagDefinition, load_and_validate};
use crate::engine::Engine;
use crate::errors::EtlError;
use crate::state::{RunState, RunStatus, RunStore};
use crate::trigger::Trigger;
use crate::warehouse::PostgresWarehouse;

/// What a CLI invocation ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was executed (validate, inspect, schedule loop stopped).
    Done,
    /// A run was executed to completion.
    Run(RunStatus),
}

impl Outcome {
    /// 0 only when nothing ran or the run fully succeeded.
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Done | Outcome::Run(RunStatus::Success) => 0,
            Outcome::Run(_) => 1,
        }
    }
}

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<Outcome> {
    let def = load_and_validate(&args.config)?;

    match args.command {
        Command::Validate => {
            print_dag(&def);
            Ok(Outcome::Done)
        }
        Command::Inspect { run } => {
            let state = find_run(&def.store(), &def, run.as_deref())?;
            print_run(&state);
            Ok(Outcome::Done)
        }
        Command::Run { tick } => {
            let engine = connect_engine(&def).await?;
            let tick = tick.unwrap_or_else(|| current_tick(&def, Utc::now()));
            abort_on_ctrl_c(&engine);

            let state = engine.run_tick(&def.store(), tick).await?;
            print_run(&state);
            Ok(Outcome::Run(state.status()))
        }
        Command::Schedule => {
            let schedule = def.schedule.clone().ok_or_else(|| {
                EtlError::Config(format!("DAG '{}' has no [dag].schedule", def.dag.id()))
            })?;
            let engine = Arc::new(connect_engine(&def).await?);
            let trigger = Trigger::new(engine, def.store(), schedule);

            let completed = trigger
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
            info!(runs = completed.len(), "scheduler stopped");
            Ok(Outcome::Done)
        }
        Command::Retry { task, run } => {
            let store = def.store();
            let mut state = find_run(&store, &def, run.as_deref())?;
            let reset = state.mark_for_retry(&def.dag, &task)?;
            store.save(&state)?;
            info!(run_id = %state.run_id, ?reset, "marked for retry; resuming run");

            let engine = connect_engine(&def).await?;
            abort_on_ctrl_c(&engine);
            let state = engine.execute(state, &store).await?;
            print_run(&state);
            Ok(Outcome::Run(state.status()))
        }
        Command::Resume { run } => {
            let store = def.store();
            let state = find_run(&store, &def, run.as_deref())?;
            if state.is_finished() {
                warn!(run_id = %state.run_id, status = %state.status(), "run already finished; nothing to resume");
                print_run(&state);
                return Ok(Outcome::Run(state.status()));
            }

            let engine = connect_engine(&def).await?;
            abort_on_ctrl_c(&engine);
            let state = engine.execute(state, &store).await?;
            print_run(&state);
            Ok(Outcome::Run(state.status()))
        }
    }
}

async fn connect_engine(def: &DagDefinition) -> Result<Engine> {
    let dsn = def.warehouse_dsn()?;
    let warehouse = PostgresWarehouse::connect(&dsn).await?;
    Ok(Engine::new(def.dag.clone(), def.engine.clone(), Arc::new(warehouse)))
}

/// Ctrl-C aborts the run: no new attempts start, running ones finish.
fn abort_on_ctrl_c(engine: &Engine) {
    let handle = engine.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; aborting run");
            handle.abort();
        }
    });
}

/// Latest schedule tick at or before `now` (within a day), else `now`.
fn current_tick(def: &DagDefinition, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(0);
    def.schedule
        .as_ref()
        .and_then(|s| s.latest_due(now - TimeDelta::days(1), now))
        .map_or(now, |due| due.tick)
}

fn find_run(store: &RunStore, def: &DagDefinition, run_id: Option<&str>) -> Result<RunState> {
    let dag_id = def.dag.id();
    let state = match run_id {
        Some(id) => store.load(dag_id, id)?,
        None => store
            .latest(dag_id)?
            .ok_or_else(|| EtlError::Store(format!("no runs recorded for DAG '{dag_id}'")))?,
    };
    Ok(state)
}

fn print_dag(def: &DagDefinition) {
    println!("dag {} ({} tasks)", def.dag.id(), def.dag.len());
    if let Some(schedule) = &def.schedule {
        println!("  schedule = {}", schedule.expression());
    }
    println!("  max_concurrency = {}", def.engine.max_concurrency);
    println!();

    for spec in def.dag.tasks() {
        println!("  - {} [{}]", spec.id, spec.kind.name());
        if !spec.upstream.is_empty() {
            let after: Vec<&str> = spec.upstream.iter().map(String::as_str).collect();
            println!("      after: {}", after.join(", "));
        }
        if spec.retry.max_attempts > 1 {
            println!(
                "      retry: {} attempts, {:?} apart",
                spec.retry.max_attempts, spec.retry.delay
            );
        }
    }
}

fn print_run(state: &RunState) {
    println!("run {} of dag {}: {}", state.run_id, state.dag_id, state.status());
    println!("  tick = {}", state.tick.to_rfc3339());
    if state.aborted {
        println!("  aborted = true");
    }
    println!();

    for (task, inst) in state.instances() {
        print!(
            "  {task:<32} {:<16} attempts {}/{}",
            inst.status,
            inst.attempts,
            inst.max_attempts
        );
        match &inst.last_error {
            Some(err) => println!("  error: {err}"),
            None => println!(),
        }
    }

    println!();
    println!("transition counters:");
    for (task, status, count) in state.counters().iter() {
        println!("  {task:<32} {status:<16} {count}");
    }
}
