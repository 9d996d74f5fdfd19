//! Dependency graph over a batch of task specifications.
//!
//! Validates the batch shape (duplicate ids, unknown dependencies,
//! cycles) before any task runs, and yields a deterministic
//! priority-aware topological order for dispatch.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::core::task::{TaskId, TaskSpec};
use crate::{Error, Result};

/// Directed acyclic graph of task specifications.
///
/// Edges point from a dependency to its dependents, so edge direction
/// follows execution order.
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskSpec, ()>,
    index: HashMap<TaskId, NodeIndex>,
    /// Original input position of each task, used as the tie-breaker
    /// after priority when ordering ready tasks.
    input_order: HashMap<TaskId, usize>,
}

impl TaskGraph {
    /// Build and validate a graph from a batch of specifications.
    ///
    /// Rejects the whole batch with a validation error when it contains
    /// duplicate task ids, references to unknown tasks, or dependency
    /// cycles. No task runs from a rejected batch.
    pub fn from_specs(specs: Vec<TaskSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::Validation("batch contains no tasks".to_string()));
        }

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut input_order = HashMap::new();

        for (position, spec) in specs.into_iter().enumerate() {
            let id = spec.id.clone();
            if index.contains_key(&id) {
                return Err(Error::Validation(format!("duplicate task id: {}", id)));
            }
            let node = graph.add_node(spec);
            index.insert(id.clone(), node);
            input_order.insert(id, position);
        }

        for node in graph.node_indices().collect::<Vec<_>>() {
            let deps = graph[node].dependencies.clone();
            let id = graph[node].id.clone();
            for dep in deps {
                let dep_node = index.get(&dep).ok_or_else(|| {
                    Error::Validation(format!("task {} depends on unknown task {}", id, dep))
                })?;
                if *dep_node == node {
                    return Err(Error::Validation(format!(
                        "task {} depends on itself",
                        id
                    )));
                }
                graph.add_edge(*dep_node, node, ());
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(Error::Validation(
                "dependency cycle detected in batch".to_string(),
            ));
        }

        Ok(Self {
            graph,
            index,
            input_order,
        })
    }

    /// Full topological order: Kahn's algorithm with the ready set
    /// ordered by (priority descending, input position ascending).
    ///
    /// Deterministic for a given batch. The scheduler dispatches from
    /// this order, so two independent tasks with different priorities
    /// start in priority order when workers permit.
    pub fn execution_order(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| {
                (
                    n,
                    self.graph
                        .neighbors_directed(n, petgraph::Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut ready: Vec<NodeIndex> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(n, _)| *n)
            .collect();
        self.sort_ready(&mut ready);

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(node) = ready.first().copied() {
            ready.remove(0);
            order.push(self.graph[node].id.clone());
            for dependent in self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
            {
                if let Some(deg) = in_degree.get_mut(&dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(dependent);
                        self.sort_ready(&mut ready);
                    }
                }
            }
        }
        order
    }

    fn sort_ready(&self, ready: &mut [NodeIndex]) {
        ready.sort_by(|a, b| {
            let spec_a = &self.graph[*a];
            let spec_b = &self.graph[*b];
            spec_b
                .priority
                .cmp(&spec_a.priority)
                .then_with(|| self.input_order[&spec_a.id].cmp(&self.input_order[&spec_b.id]))
        });
    }

    /// Ids of the tasks the given task depends on.
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.index
            .get(id)
            .map(|node| {
                self.graph
                    .neighbors_directed(*node, petgraph::Direction::Incoming)
                    .map(|n| self.graph[n].id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of the tasks that depend on the given task.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.index
            .get(id)
            .map(|node| {
                self.graph
                    .neighbors_directed(*node, petgraph::Direction::Outgoing)
                    .map(|n| self.graph[n].id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.index.get(id).map(|node| &self.graph[*node])
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.graph
            .node_indices()
            .map(|n| self.graph[n].id.clone())
            .collect()
    }
}
