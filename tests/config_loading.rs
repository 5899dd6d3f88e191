// tests/config_loading.rs

mod common;
use crate::common::builders::{SPARKIFY_TOML, clean_checks};
use crate::common::{FakeWarehouse, init_tracing, tick, with_timeout};

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use etlgraph::config::load_and_validate;
use etlgraph::dag::TaskKind;
use etlgraph::engine::Engine;
use etlgraph::errors::{EtlError, ValidationError};
use etlgraph::state::{RunStatus, RunStore, StorageMode, TaskStatus};
use etlgraph::warehouse::LoadMode;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("etlgraph.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn sparkify_definition_loads_with_defaults_applied() {
    let (_dir, path) = write_config(SPARKIFY_TOML);
    let def = load_and_validate(&path).unwrap();

    assert_eq!(def.dag.id(), "sparkify");
    assert_eq!(def.dag.len(), 24);
    assert_eq!(def.engine.max_concurrency, 4);
    assert_eq!(def.storage, StorageMode::File);
    assert_eq!(def.schedule.as_ref().unwrap().expression(), "0 * * * *");

    let mut stage_deps: Vec<_> = def.dag.dependencies_of("Stage_songs").collect();
    stage_deps.sort();
    assert_eq!(stage_deps, vec!["Tables_created"]);
    assert_eq!(def.dag.dependencies_of("Tables_created").count(), 7);
    assert_eq!(def.dag.dependencies_of("Stop_execution").count(), 5);

    let fact = def.dag.task("Load_songplays_fact_table").unwrap();
    assert!(matches!(fact.kind, TaskKind::LoadFact(_)));
    assert_eq!(fact.retry.max_attempts, 3);
    assert_eq!(fact.retry.delay, Duration::from_secs(300));

    let TaskKind::BulkLoad(stage) = &def.dag.task("Stage_events").unwrap().kind else {
        panic!("Stage_events should be a bulk load");
    };
    assert_eq!(stage.request.mode, LoadMode::Replace);
    assert_eq!(
        stage.request.format.as_deref(),
        Some("JSON 's3://udacity-dend/log_json_path.json'")
    );

    for id in ["Load_user_dim_table", "Load_time_dim_table"] {
        let TaskKind::LoadDimension(dim) = &def.dag.task(id).unwrap().kind else {
            panic!("{id} should be a dimension load");
        };
        assert!(dim.truncate, "{id}");
    }
}

#[test]
fn checked_in_dag_file_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/dags/sparkify.toml");
    let def = load_and_validate(path).unwrap();

    let order = def.dag.topological_order();
    let pos = |id: &str| order.iter().position(|t| t == id).unwrap();
    assert_eq!(pos("Begin_execution"), 0);
    assert_eq!(pos("Stop_execution"), order.len() - 1);
    assert!(pos("staging_songs_table_create") < pos("Stage_songs"));
    assert!(pos("Staging_complete") < pos("Load_songplays_fact_table"));
    assert!(pos("Loading_complete") < pos("Songplays_quality_checks"));
}

#[test]
fn cyclic_definition_is_rejected_before_any_run() {
    let toml = r#"
[dag]
id = "loop"

[task.a]
kind = "noop"
after = ["b"]

[task.b]
kind = "noop"
after = ["a"]
"#;
    let (_dir, path) = write_config(toml);

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, EtlError::Validation(ValidationError::Cycle(_))));
}

#[test]
fn unknown_dependency_is_rejected() {
    let toml = r#"
[dag]
id = "dangling"

[task.a]
kind = "noop"
after = ["ghost"]
"#;
    let (_dir, path) = write_config(toml);

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(
        err,
        EtlError::Validation(ValidationError::UnknownDependency { .. })
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EtlError::Io(_)));
}

#[tokio::test]
async fn checked_in_dag_file_runs_to_success() {
    init_tracing();
    let def = load_and_validate(concat!(env!("CARGO_MANIFEST_DIR"), "/dags/sparkify.toml")).unwrap();

    let warehouse = Arc::new(FakeWarehouse::new().returning("null_count", clean_checks()));
    let engine = Engine::new(def.dag.clone(), def.engine.clone(), warehouse.clone());

    let run = with_timeout(engine.run_tick(&RunStore::memory(), tick())).await.unwrap();

    assert_eq!(run.status(), RunStatus::Success);
    assert_eq!(run.counters().total(TaskStatus::Success), 24);
    assert_eq!(warehouse.loads().len(), 2);
    assert_eq!(warehouse.calls_matching("CREATE TABLE IF NOT EXISTS"), 7);
    assert_eq!(warehouse.calls_matching("TRUNCATE"), 4);
    assert_eq!(warehouse.calls_matching("null_count"), 5);
}
