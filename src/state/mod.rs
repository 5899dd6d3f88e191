// src/state/mod.rs

//! Run state: per-task instances, the run aggregate and its persistence.

pub mod counters;
pub mod run_state;
pub mod store;
pub mod task_instance;

pub use counters::TransitionCounters;
pub use run_state::{RunState, RunStatus, run_id_for};
pub use store::{RunStore, StorageMode};
pub use task_instance::{TaskInstance, TaskStatus};
