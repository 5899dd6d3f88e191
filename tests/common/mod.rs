// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use etlgraph::dag::Dag;
use etlgraph::engine::{Engine, EngineConfig};
use etlgraph::state::{RunState, RunStore};

pub use etlgraph_test_utils::builders;
pub use etlgraph_test_utils::{FakeWarehouse, Response, init_tracing, with_timeout};

/// Fixed tick so run ids are predictable.
pub fn tick() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 1, 12, 10, 0, 0).unwrap()
}

pub fn engine(dag: Arc<Dag>, warehouse: Arc<FakeWarehouse>, max_concurrency: usize) -> Engine {
    Engine::new(dag, EngineConfig::new(max_concurrency), warehouse)
}

/// Execute one run of `dag` against `warehouse` in an in-memory store.
pub async fn run_once(dag: Arc<Dag>, warehouse: Arc<FakeWarehouse>) -> RunState {
    let engine = engine(dag, warehouse, 4);
    with_timeout(engine.run_tick(&RunStore::memory(), tick()))
        .await
        .expect("run should complete")
}
