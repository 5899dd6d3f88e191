// src/dag/mod.rs

//! DAG model.
//!
//! - [`spec`] holds the immutable [`TaskSpec`] and its executor variant.
//! - [`retry`] contains retry policies and pluggable backoff strategies.
//! - [`graph`] is the validated [`Dag`] (acyclic, unique ids, no dangling
//!   dependencies).
//! - [`builder`] offers a fluent API with fan-out / fan-in helpers.

pub mod builder;
pub mod graph;
pub mod retry;
pub mod spec;

pub use builder::DagBuilder;
pub use graph::Dag;
pub use retry::{BackoffStrategy, Exponential, Fixed, RetryPolicy};
pub use spec::{TaskId, TaskKind, TaskSpec};
