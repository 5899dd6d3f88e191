// crates/test-utils/src/builders.rs

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use etlgraph::dag::{Dag, DagBuilder, RetryPolicy, TaskKind, TaskSpec};
use etlgraph::exec::{BulkLoad, CreateTable, DataQualityCheck, LoadDimension, LoadFact};
use etlgraph::warehouse::{LoadMode, RowSet, Value};

/// Fast retry policy for tests: `max_attempts` attempts, `delay_ms` apart.
pub fn quick_retry(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
    RetryPolicy::fixed(max_attempts, Duration::from_millis(delay_ms))
}

/// A task that issues one statement containing `<id>_tbl`, so a
/// [`crate::FakeWarehouse`] can be scripted per task with that pattern.
pub fn sql_task(id: &str) -> TaskSpec {
    TaskSpec::new(
        id,
        TaskKind::CreateTable(CreateTable::new(format!(
            "CREATE TABLE IF NOT EXISTS {id}_tbl (id INTEGER);"
        ))),
    )
    .retry(RetryPolicy::none())
}

/// Builder for small DAGs of [`sql_task`]s.
pub struct DagFixture {
    builder: DagBuilder,
}

impl DagFixture {
    pub fn new(id: &str) -> Self {
        Self {
            builder: DagBuilder::new(id),
        }
    }

    pub fn task(mut self, id: &str) -> Self {
        self.builder = self.builder.task(sql_task(id));
        self
    }

    pub fn retrying(mut self, id: &str, retry: RetryPolicy) -> Self {
        self.builder = self.builder.task(sql_task(id).retry(retry));
        self
    }

    pub fn spec(mut self, spec: TaskSpec) -> Self {
        self.builder = self.builder.task(spec);
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.builder = self.builder.edge(from, to);
        self
    }

    pub fn build(self) -> Arc<Dag> {
        Arc::new(self.builder.build().expect("fixture DAG must be valid"))
    }
}

/// `A -> {B, C} -> D`.
pub fn diamond() -> Arc<Dag> {
    DagFixture::new("diamond")
        .task("A")
        .task("B")
        .task("C")
        .task("D")
        .edge("A", "B")
        .edge("A", "C")
        .edge("B", "D")
        .edge("C", "D")
        .build()
}

/// Dimensions rebuilt after the fact load, as `(task, table, source)`.
const DIMENSIONS: [(&str, &str, &str); 4] = [
    ("Load_user_dim_table", "users", "staging_events"),
    ("Load_song_dim_table", "songs", "staging_songs"),
    ("Load_artist_dim_table", "artists", "staging_songs"),
    ("Load_time_dim_table", "time", "staging_events"),
];

/// Quality checks as `(task, table)`. Each returns one `<table>_null_count`
/// column, so a [`crate::FakeWarehouse`] can target a single check.
const CHECKS: [(&str, &str); 5] = [
    ("User_quality_checks", "users"),
    ("Time_quality_checks", "time"),
    ("Songs_quality_checks", "songs"),
    ("Artists_quality_checks", "artists"),
    ("Songplays_quality_checks", "songplays"),
];

/// Create-table tasks as `(task, table)`.
const TABLES: [(&str, &str); 7] = [
    ("songplay_table_create", "songplays"),
    ("user_table_create", "users"),
    ("song_table_create", "songs"),
    ("artist_table_create", "artists"),
    ("time_table_create", "time"),
    ("staging_events_table_create", "staging_events"),
    ("staging_songs_table_create", "staging_songs"),
];

/// The music-streaming pipeline with the same shape as `dags/sparkify.toml`:
/// create tables, stage events and songs, load the fact, rebuild four
/// dimensions, run five quality checks. 24 tasks.
pub fn sparkify(retry: RetryPolicy) -> Arc<Dag> {
    let with_retry = |spec: TaskSpec| spec.retry(retry.clone());
    let mut builder = DagBuilder::new("sparkify")
        .task(TaskSpec::noop("Begin_execution"))
        .task(TaskSpec::noop("Tables_created"))
        .task(TaskSpec::noop("Staging_complete"))
        .task(TaskSpec::noop("Loading_complete"))
        .task(TaskSpec::noop("Stop_execution"));

    for (id, table) in TABLES {
        builder = builder.task(with_retry(TaskSpec::new(
            id,
            TaskKind::CreateTable(CreateTable::new(format!(
                "CREATE TABLE IF NOT EXISTS {table} (id INTEGER);"
            ))),
        )));
    }

    for (id, target, key) in [
        ("Stage_events", "staging_events", "log-data"),
        ("Stage_songs", "staging_songs", "song-data"),
    ] {
        builder = builder.task(with_retry(TaskSpec::new(
            id,
            TaskKind::BulkLoad(
                BulkLoad::new(format!("s3://udacity-dend/{key}"), target, LoadMode::Replace)
                    .format("JSON 'auto'"),
            ),
        )));
    }

    builder = builder.task(with_retry(TaskSpec::new(
        "Load_songplays_fact_table",
        TaskKind::LoadFact(LoadFact::new(
            "INSERT INTO songplays(start_time, user_id) SELECT ts, userId FROM staging_events",
        )),
    )));

    for (id, table, source) in DIMENSIONS {
        builder = builder.task(with_retry(TaskSpec::new(
            id,
            TaskKind::LoadDimension(LoadDimension::new(
                format!("INSERT INTO {table}(id) SELECT DISTINCT id FROM {source}"),
                true,
            )),
        )));
    }

    for (id, table) in CHECKS {
        builder = builder.task(with_retry(TaskSpec::new(
            id,
            TaskKind::DataQualityCheck(DataQualityCheck::new(format!(
                "SELECT COUNT(*) - COUNT(id) AS {table}_null_count FROM {table}"
            ))),
        )));
    }

    let create_ids = TABLES.map(|(id, _)| id);
    let dimension_ids = DIMENSIONS.map(|(id, _, _)| id);
    let check_ids = CHECKS.map(|(id, _)| id);
    let dag = builder
        .fan_out("Begin_execution", create_ids)
        .fan_in(create_ids, "Tables_created")
        .fan_out("Tables_created", ["Stage_events", "Stage_songs"])
        .fan_in(["Stage_events", "Stage_songs"], "Staging_complete")
        .edge("Staging_complete", "Load_songplays_fact_table")
        .fan_out("Load_songplays_fact_table", dimension_ids)
        .fan_in(dimension_ids, "Loading_complete")
        .fan_out("Loading_complete", check_ids)
        .fan_in(check_ids, "Stop_execution")
        .build()
        .expect("sparkify DAG is valid");
    Arc::new(dag)
}

/// One all-zero row, which passes every quality check.
pub fn clean_checks() -> RowSet {
    RowSet::new(["null_count"]).with_row(vec![Value::Int(0)])
}

/// The checked-in sparkify definition.
pub const SPARKIFY_TOML: &str = include_str!("../../../dags/sparkify.toml");
