// tests/store_and_resume.rs

mod common;
use crate::common::builders::diamond;
use crate::common::{FakeWarehouse, engine, init_tracing, tick, with_timeout};

use std::sync::Arc;

use etlgraph::errors::EtlError;
use etlgraph::state::{RunStatus, RunStore, TaskStatus, run_id_for};

#[tokio::test]
async fn finished_run_is_persisted_to_disk() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::file(dir.path());

    let engine = engine(diamond(), Arc::new(FakeWarehouse::new()), 2);
    let run = with_timeout(engine.run_tick(&store, tick())).await.unwrap();

    let loaded = store.load("diamond", &run.run_id).unwrap();
    assert_eq!(loaded.run_id, run_id_for(tick()));
    assert_eq!(loaded.status(), RunStatus::Success);
    assert_eq!(loaded.counters(), run.counters());
    assert_eq!(store.list("diamond").unwrap(), vec![run.run_id.clone()]);
}

#[tokio::test]
async fn same_tick_cannot_run_twice() {
    init_tracing();
    let store = RunStore::memory();
    let engine = engine(diamond(), Arc::new(FakeWarehouse::new()), 2);

    with_timeout(engine.run_tick(&store, tick())).await.unwrap();
    let err = with_timeout(engine.run_tick(&store, tick())).await.unwrap_err();
    assert!(matches!(err, EtlError::Store(_)));
}

#[tokio::test]
async fn operator_retry_resumes_a_failed_run() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::file(dir.path());
    let dag = diamond();

    let failing = Arc::new(FakeWarehouse::new().failing("C_tbl"));
    let first = with_timeout(engine(dag.clone(), failing, 2).run_tick(&store, tick()))
        .await
        .unwrap();
    assert_eq!(first.status(), RunStatus::Failed);

    let mut state = store.load("diamond", &first.run_id).unwrap();
    let mut reset = state.mark_for_retry(&dag, "C").unwrap();
    reset.sort();
    assert_eq!(reset, vec!["C".to_string(), "D".to_string()]);
    store.save(&state).unwrap();

    let healthy = Arc::new(FakeWarehouse::new());
    let resumed = with_timeout(engine(dag.clone(), healthy.clone(), 2).execute(state, &store))
        .await
        .unwrap();

    assert_eq!(resumed.status(), RunStatus::Success);
    // A and B already succeeded and are not executed again.
    assert_eq!(healthy.calls_matching("A_tbl"), 0);
    assert_eq!(healthy.calls_matching("B_tbl"), 0);
    assert_eq!(healthy.calls_matching("C_tbl"), 1);
    assert_eq!(resumed.counters().get("C", TaskStatus::Failed), 1);
    assert_eq!(resumed.counters().get("C", TaskStatus::Success), 1);
    assert_eq!(resumed.counters().get("D", TaskStatus::UpstreamFailed), 1);

    let on_disk = store.latest("diamond").unwrap().unwrap();
    assert_eq!(on_disk.status(), RunStatus::Success);
}

#[tokio::test]
async fn retry_of_a_successful_task_is_rejected() {
    init_tracing();
    let store = RunStore::memory();
    let dag = diamond();
    let run = with_timeout(engine(dag.clone(), Arc::new(FakeWarehouse::new()), 2).run_tick(&store, tick()))
        .await
        .unwrap();

    let mut state = run.clone();
    let err = state.mark_for_retry(&dag, "A").unwrap_err();
    assert!(matches!(err, EtlError::RetryRejected { .. }));
    assert_eq!(state.status_of("A"), Some(TaskStatus::Success));
}
