// src/state/counters.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dag::TaskId;
use crate::state::task_instance::TaskStatus;

/// Counter per `(task, status)`: how many times each task entered each status
/// during a run. Persisted with the run so `inspect` can show retry churn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionCounters {
    counts: BTreeMap<TaskId, BTreeMap<TaskStatus, u64>>,
}

impl TransitionCounters {
    pub fn record(&mut self, task: &str, status: TaskStatus) {
        *self
            .counts
            .entry(task.to_string())
            .or_default()
            .entry(status)
            .or_insert(0) += 1;
    }

    pub fn get(&self, task: &str, status: TaskStatus) -> u64 {
        self.counts
            .get(task)
            .and_then(|by_status| by_status.get(&status))
            .copied()
            .unwrap_or(0)
    }

    /// Sum over all tasks for one status.
    pub fn total(&self, status: TaskStatus) -> u64 {
        self.counts
            .values()
            .filter_map(|by_status| by_status.get(&status))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TaskStatus, u64)> {
        self.counts.iter().flat_map(|(task, by_status)| {
            by_status
                .iter()
                .map(move |(status, count)| (task.as_str(), *status, *count))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_task_and_status() {
        let mut c = TransitionCounters::default();
        c.record("A", TaskStatus::Running);
        c.record("A", TaskStatus::Running);
        c.record("B", TaskStatus::Running);
        c.record("A", TaskStatus::Failed);

        assert_eq!(c.get("A", TaskStatus::Running), 2);
        assert_eq!(c.get("A", TaskStatus::Success), 0);
        assert_eq!(c.total(TaskStatus::Running), 3);
        assert_eq!(c.iter().count(), 3);
    }

    #[test]
    fn round_trips_through_json() {
        let mut c = TransitionCounters::default();
        c.record("A", TaskStatus::UpstreamFailed);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"A":{"upstream_failed":1}}"#);
        let back: TransitionCounters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
