// src/dag/builder.rs

use crate::dag::graph::Dag;
use crate::dag::spec::{TaskId, TaskSpec};
use crate::errors::ValidationError;

/// Fluent construction of a [`Dag`] from tasks and edges.
///
/// Fan-out is simply several edges from one source; fan-in (an AND-join) is
/// several edges into one target.
///
/// ```
/// use etlgraph::dag::{DagBuilder, TaskSpec};
///
/// let dag = DagBuilder::new("example")
///     .task(TaskSpec::noop("Begin"))
///     .task(TaskSpec::noop("B"))
///     .task(TaskSpec::noop("C"))
///     .task(TaskSpec::noop("End"))
///     .fan_out("Begin", ["B", "C"])
///     .fan_in(["B", "C"], "End")
///     .build()
///     .unwrap();
/// assert_eq!(dag.dependents_of("Begin").len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct DagBuilder {
    id: String,
    tasks: Vec<TaskSpec>,
    edges: Vec<(TaskId, TaskId)>,
}

impl DagBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    /// `from` must succeed before `to` runs.
    pub fn edge(mut self, from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn fan_out<I, S>(mut self, from: impl Into<TaskId>, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        let from = from.into();
        for target in to {
            self.edges.push((from.clone(), target.into()));
        }
        self
    }

    pub fn fan_in<I, S>(mut self, from: I, to: impl Into<TaskId>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        let to = to.into();
        for source in from {
            self.edges.push((source.into(), to.clone()));
        }
        self
    }

    /// Linear chain `a -> b -> c ...`.
    pub fn chain<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        let ids: Vec<TaskId> = ids.into_iter().map(Into::into).collect();
        for pair in ids.windows(2) {
            self.edges.push((pair[0].clone(), pair[1].clone()));
        }
        self
    }

    pub fn build(self) -> Result<Dag, ValidationError> {
        Dag::build(self.id, self.tasks, self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_and_fan_edges_are_merged() {
        let dag = DagBuilder::new("shape")
            .task(TaskSpec::noop("A"))
            .task(TaskSpec::noop("B"))
            .task(TaskSpec::noop("C"))
            .task(TaskSpec::noop("D"))
            .chain(["A", "B"])
            .fan_out("A", ["C"])
            .fan_in(["B", "C"], "D")
            .build()
            .unwrap();

        let mut d_deps: Vec<_> = dag.dependencies_of("D").collect();
        d_deps.sort();
        assert_eq!(d_deps, vec!["B", "C"]);
        assert_eq!(dag.dependencies_of("B").collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn invalid_edges_fail_the_whole_build() {
        let err = DagBuilder::new("bad")
            .task(TaskSpec::noop("A"))
            .edge("A", "missing")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownTask("missing".into()));
    }
}
