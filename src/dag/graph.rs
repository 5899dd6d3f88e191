// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::spec::{TaskId, TaskSpec};
use crate::errors::ValidationError;

/// Validated, immutable DAG of tasks.
///
/// Only [`Dag::build`] creates one, and it either returns a fully valid graph
/// or an error: unique ids, every referenced dependency exists, no cycles.
#[derive(Debug, Clone)]
pub struct Dag {
    id: String,
    tasks: BTreeMap<TaskId, TaskSpec>,
    /// Direct dependents: tasks that list this one as upstream.
    dependents: HashMap<TaskId, Vec<TaskId>>,
    /// All task ids in a dependency-respecting order.
    order: Vec<TaskId>,
}

impl Dag {
    /// Build a DAG from task specs plus extra `(upstream, downstream)` edges.
    ///
    /// Edges are merged into the downstream task's upstream set, so a
    /// dependency may be declared either on the task or as an edge.
    pub fn build(
        id: impl Into<String>,
        tasks: Vec<TaskSpec>,
        edges: Vec<(TaskId, TaskId)>,
    ) -> Result<Self, ValidationError> {
        if tasks.is_empty() {
            return Err(ValidationError::EmptyDag);
        }

        let mut by_id: BTreeMap<TaskId, TaskSpec> = BTreeMap::new();
        for spec in tasks {
            if by_id.contains_key(&spec.id) {
                return Err(ValidationError::DuplicateTask(spec.id));
            }
            by_id.insert(spec.id.clone(), spec);
        }

        for (from, to) in edges {
            match by_id.get_mut(&to) {
                Some(spec) => {
                    spec.upstream.insert(from);
                }
                None => return Err(ValidationError::UnknownTask(to)),
            }
        }

        for spec in by_id.values() {
            for dep in &spec.upstream {
                if dep == &spec.id {
                    return Err(ValidationError::SelfDependency(spec.id.clone()));
                }
                if !by_id.contains_key(dep) {
                    return Err(ValidationError::UnknownDependency {
                        task: spec.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            spec.kind
                .executor()
                .validate()
                .map_err(|reason| ValidationError::InvalidParameter {
                    task: spec.id.clone(),
                    reason,
                })?;
        }

        let order = topological_order(&by_id)?;

        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for spec in by_id.values() {
            for dep in &spec.upstream {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(spec.id.clone());
            }
        }

        Ok(Self {
            id: id.into(),
            tasks: by_id,
            dependents,
            order,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.get(id)
    }

    /// Tasks in topological order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn topological_order(&self) -> &[TaskId] {
        &self.order
    }

    /// Tasks without upstream dependencies.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.tasks
            .values()
            .filter(|spec| spec.upstream.is_empty())
            .map(|spec| spec.id.as_str())
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.tasks
            .get(id)
            .into_iter()
            .flat_map(|spec| spec.upstream.iter().map(String::as_str))
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.dependents
            .get(id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// All direct and transitive dependents of a task, without duplicates.
    pub fn descendants_of(&self, id: &str) -> Vec<TaskId> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self.dependents_of(id).iter().map(String::as_str).collect();
        let mut out = Vec::new();

        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            out.push(name.to_string());
            stack.extend(self.dependents_of(name).iter().map(String::as_str));
        }

        out
    }
}

fn topological_order(tasks: &BTreeMap<TaskId, TaskSpec>) -> Result<Vec<TaskId>, ValidationError> {
    // Edge direction: upstream -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }
    for spec in tasks.values() {
        for dep in &spec.upstream {
            graph.add_edge(dep.as_str(), spec.id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(ValidationError::Cycle(cycle.node_id().to_string())),
    }
}
