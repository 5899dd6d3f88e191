// src/dag/spec.rs

//! Immutable task descriptions.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::dag::retry::RetryPolicy;
use crate::errors::ExecutorError;
use crate::exec::{
    BulkLoad, CreateTable, DataQualityCheck, Executor, LoadDimension, LoadFact, Noop,
};

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// The executor variant of a task together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Noop(Noop),
    CreateTable(CreateTable),
    BulkLoad(BulkLoad),
    LoadFact(LoadFact),
    LoadDimension(LoadDimension),
    DataQualityCheck(DataQualityCheck),
}

impl TaskKind {
    pub fn executor(&self) -> &dyn Executor {
        match self {
            TaskKind::Noop(e) => e,
            TaskKind::CreateTable(e) => e,
            TaskKind::BulkLoad(e) => e,
            TaskKind::LoadFact(e) => e,
            TaskKind::LoadDimension(e) => e,
            TaskKind::DataQualityCheck(e) => e,
        }
    }

    pub fn name(&self) -> &'static str {
        self.executor().kind()
    }
}

/// One node of the DAG.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: TaskId,
    pub kind: TaskKind,
    pub retry: RetryPolicy,
    /// Wall-clock limit per attempt; falls back to the engine default.
    pub timeout: Option<Duration>,
    /// Tasks that must succeed before this one may run.
    pub upstream: BTreeSet<TaskId>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            kind,
            retry: RetryPolicy::default(),
            timeout: None,
            upstream: BTreeSet::new(),
        }
    }

    pub fn noop(id: impl Into<TaskId>) -> Self {
        Self::new(id, TaskKind::Noop(Noop))
    }

    pub fn after<I, S>(mut self, upstream: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.upstream.extend(upstream.into_iter().map(Into::into));
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether a failed attempt with `error` may be retried at all (the
    /// attempt budget is checked separately).
    pub fn allows_retry(&self, error: &ExecutorError) -> bool {
        match error {
            ExecutorError::TargetNotResolved(_) => false,
            e if e.is_quality_failure() => self.retry.retry_quality_failures,
            e if e.is_ambiguous_commit() => match &self.kind {
                TaskKind::LoadFact(fact) => fact.retry_safe,
                _ => true,
            },
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WarehouseError;

    fn fact(retry_safe: bool) -> TaskSpec {
        TaskSpec::new(
            "Load_songplays_fact_table",
            TaskKind::LoadFact(
                LoadFact::new("INSERT INTO songplays(a) SELECT DISTINCT a FROM s")
                    .retry_safe(retry_safe),
            ),
        )
    }

    #[test]
    fn unresolvable_target_is_never_retried() {
        let spec = TaskSpec::noop("x");
        assert!(!spec.allows_retry(&ExecutorError::TargetNotResolved("sql".into())));
    }

    #[test]
    fn quality_failures_retry_only_when_opted_in() {
        let spec = TaskSpec::noop("x");
        assert!(!spec.allows_retry(&ExecutorError::NoRows));

        let spec = spec.retry(RetryPolicy::default().retry_quality_failures(true));
        assert!(spec.allows_retry(&ExecutorError::DataQuality {
            column: "c".into(),
            value: "1".into()
        }));
    }

    #[test]
    fn fact_loads_refuse_ambiguous_retries_unless_retry_safe() {
        let timeout = ExecutorError::Timeout(Duration::from_secs(1));
        let statement = ExecutorError::Warehouse(WarehouseError::Statement("boom".into()));

        assert!(!fact(false).allows_retry(&timeout));
        assert!(fact(false).allows_retry(&statement));
        assert!(fact(true).allows_retry(&timeout));
    }
}
