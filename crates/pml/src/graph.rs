// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Task graph admission and topological layering.
//!
//! A [`TaskGraph`] is validated once on admission and immutable afterwards.
//! Layering is Kahn's algorithm taken a whole ready-set at a time: layer `Li`
//! is every task whose dependencies all sit in `L0..L(i-1)`. Within a layer,
//! tasks are ordered by ascending priority then ascending id so that layering
//! is deterministic across runs.
//!
//! Rules enforced at admission:
//! 1. Task ids must be unique.
//! 2. Every `depends_on` entry must name a known task.
//! 3. Every `Reference(t, _)` argument must have `t` in `depends_on`.
//! 4. The dependency relation must be acyclic; on failure the residual task
//!    set is reported.

use crate::error::{Error, Result};
use crate::task::{ArgSpec, Task, TaskId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A validated, layered workflow DAG.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, Task>,
    layers: Vec<Vec<TaskId>>,
    layer_of: HashMap<TaskId, usize>,
}

impl TaskGraph {
    /// Validate and layer a set of tasks.
    ///
    /// # Errors
    /// - [`Error::DuplicateTask`] if two tasks share an id.
    /// - [`Error::UnknownDependency`] if a dependency names a missing task.
    /// - [`Error::ReferenceOutsideDependencies`] if a reference argument
    ///   points outside the task's `depends_on` set.
    /// - [`Error::CyclicGraph`] if the graph is not acyclic.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        let mut map: BTreeMap<TaskId, Task> = BTreeMap::new();
        for task in tasks {
            if map.contains_key(&task.id) {
                return Err(Error::DuplicateTask(task.id));
            }
            map.insert(task.id.clone(), task);
        }

        Self::validate(&map)?;
        let layers = Self::compute_layers(&map, |_| 0)?;
        let layer_of = index_layers(&layers);

        Ok(Self {
            tasks: map,
            layers,
            layer_of,
        })
    }

    fn validate(tasks: &BTreeMap<TaskId, Task>) -> Result<()> {
        for task in tasks.values() {
            for dep in &task.depends_on {
                if !tasks.contains_key(dep) {
                    return Err(Error::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                if dep == &task.id {
                    return Err(Error::CyclicGraph {
                        remaining: vec![task.id.clone()],
                    });
                }
            }
            for spec in task.arguments.values() {
                if let ArgSpec::Reference { task_id, .. } = spec {
                    if !task.depends_on.contains(task_id) {
                        return Err(Error::ReferenceOutsideDependencies {
                            task: task.id.clone(),
                            reference: task_id.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Kahn layering with a per-task floor. `floor(id)` is the minimum layer
    /// index a task may occupy; admission uses 0 everywhere, replan raises the
    /// floor for appended tasks so they land after already-executed layers.
    fn compute_layers<F>(tasks: &BTreeMap<TaskId, Task>, floor: F) -> Result<Vec<Vec<TaskId>>>
    where
        F: Fn(&TaskId) -> usize,
    {
        let mut assigned: HashMap<&TaskId, usize> = HashMap::new();
        let mut remaining: HashSet<&TaskId> = tasks.keys().collect();

        while !remaining.is_empty() {
            // Ready set: all dependencies already assigned.
            let mut ready: Vec<&TaskId> = remaining
                .iter()
                .filter(|id| {
                    tasks[**id]
                        .depends_on
                        .iter()
                        .all(|dep| assigned.contains_key(dep))
                })
                .copied()
                .collect();

            if ready.is_empty() {
                let mut residual: Vec<String> =
                    remaining.iter().map(|id| (*id).clone()).collect();
                residual.sort();
                return Err(Error::CyclicGraph { remaining: residual });
            }

            ready.sort();
            for id in ready {
                let dep_layer = tasks[id]
                    .depends_on
                    .iter()
                    .map(|dep| assigned[dep] + 1)
                    .max()
                    .unwrap_or(0);
                assigned.insert(id, dep_layer.max(floor(id)));
                remaining.remove(id);
            }
        }

        let depth = assigned.values().copied().max().map_or(0, |d| d + 1);
        let mut layers: Vec<Vec<TaskId>> = vec![Vec::new(); depth];
        for (id, layer) in assigned {
            layers[layer].push(id.clone());
        }
        for layer in &mut layers {
            layer.sort_by(|a, b| {
                let pa = tasks[a].priority;
                let pb = tasks[b].priority;
                pa.cmp(&pb).then_with(|| a.cmp(b))
            });
        }
        Ok(layers)
    }

    /// Replan support: append tasks, keeping every existing task in its layer.
    ///
    /// Appended tasks are placed no earlier than `after_layer + 1`, so tasks
    /// the executor already completed keep their positions and new work always
    /// lands in the unexecuted suffix. Returns a new graph; the original stays
    /// valid for in-flight readers.
    pub fn extend(&self, new_tasks: Vec<Task>, after_layer: usize) -> Result<Self> {
        if new_tasks.is_empty() {
            return Ok(self.clone());
        }

        let mut merged = self.tasks.clone();
        let mut appended: HashSet<TaskId> = HashSet::new();
        for task in new_tasks {
            if merged.contains_key(&task.id) {
                return Err(Error::DuplicateTask(task.id));
            }
            appended.insert(task.id.clone());
            merged.insert(task.id.clone(), task);
        }

        Self::validate(&merged)?;

        let existing = &self.layer_of;
        let layers = Self::compute_layers(&merged, |id| {
            if appended.contains(id) {
                after_layer + 1
            } else {
                // Pin existing tasks to their admitted layer.
                existing.get(id).copied().unwrap_or(0)
            }
        })?;

        // Pinning must not have moved any existing task.
        for (id, layer) in index_layers(&layers) {
            if !appended.contains(&id) && existing.get(&id) != Some(&layer) {
                return Err(Error::Validation(format!(
                    "replan would move task '{id}' across layers"
                )));
            }
        }

        let layer_of = index_layers(&layers);
        Ok(Self {
            tasks: merged,
            layers,
            layer_of,
        })
    }

    /// The computed layers, outermost order first.
    pub fn layers(&self) -> &[Vec<TaskId>] {
        &self.layers
    }

    /// Layer index of a task.
    pub fn layer_of(&self, id: &str) -> Option<usize> {
        self.layer_of.get(id).copied()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Direct dependents of a task.
    pub fn dependents_of(&self, id: &str) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| t.depends_on.contains(id))
            .collect()
    }

    /// Transitive dependents, used for skip propagation on failure.
    pub fn transitive_dependents_of(&self, id: &str) -> Vec<&Task> {
        let mut frontier: Vec<&str> = vec![id];
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(current) = frontier.pop() {
            for task in self.tasks.values() {
                if task.depends_on.contains(current) && seen.insert(task.id.as_str()) {
                    frontier.push(task.id.as_str());
                }
            }
        }
        let mut out: Vec<&Task> = seen.iter().map(|id| &self.tasks[*id]).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

fn index_layers(layers: &[Vec<TaskId>]) -> HashMap<TaskId, usize> {
    layers
        .iter()
        .enumerate()
        .flat_map(|(i, layer)| layer.iter().map(move |id| (id.clone(), i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ArgSpec;

    fn tool(id: &str) -> Task {
        Task::tool_call(id, format!("test:{id}"))
    }

    #[test]
    fn diamond_layers_as_expected() {
        // a -> {b, c} -> d
        let graph = TaskGraph::new(vec![
            tool("a"),
            tool("b").depends_on(["a"]),
            tool("c").depends_on(["a"]),
            tool("d").depends_on(["b", "c"]),
        ])
        .unwrap();

        assert_eq!(
            graph.layers(),
            &[
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn independent_tasks_share_layer_zero() {
        let graph = TaskGraph::new(vec![tool("x"), tool("y"), tool("z")]).unwrap();
        assert_eq!(graph.layers().len(), 1);
        assert_eq!(graph.layers()[0].len(), 3);
    }

    #[test]
    fn priority_orders_within_layer_before_id() {
        let graph = TaskGraph::new(vec![
            tool("zz").with_priority(-5),
            tool("aa"),
            tool("mm"),
        ])
        .unwrap();
        assert_eq!(
            graph.layers()[0],
            vec!["zz".to_string(), "aa".to_string(), "mm".to_string()]
        );
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let err = TaskGraph::new(vec![tool("a"), tool("a")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateTask(id) if id == "a"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = TaskGraph::new(vec![tool("a").depends_on(["ghost"])]).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownDependency { dependency, .. } if dependency == "ghost"
        ));
    }

    #[test]
    fn reference_outside_depends_on_is_rejected() {
        let task = tool("b").with_arg("input", ArgSpec::reference("a", "content"));
        let err = TaskGraph::new(vec![tool("a"), task]).unwrap_err();
        assert!(matches!(
            err,
            Error::ReferenceOutsideDependencies { task, reference }
                if task == "b" && reference == "a"
        ));
    }

    #[test]
    fn cycle_reports_residual_set() {
        let err = TaskGraph::new(vec![
            tool("a").depends_on(["c"]),
            tool("b").depends_on(["a"]),
            tool("c").depends_on(["b"]),
            tool("free"),
        ])
        .unwrap_err();
        match err {
            Error::CyclicGraph { remaining } => {
                assert_eq!(remaining, vec!["a", "b", "c"]);
            }
            other => panic!("expected CyclicGraph, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = TaskGraph::new(vec![tool("a").depends_on(["a"])]).unwrap_err();
        assert!(matches!(err, Error::CyclicGraph { .. }));
    }

    #[test]
    fn every_dependency_lands_in_an_earlier_layer() {
        let graph = TaskGraph::new(vec![
            tool("a"),
            tool("b").depends_on(["a"]),
            tool("c").depends_on(["a", "b"]),
            tool("d"),
            tool("e").depends_on(["d", "c"]),
        ])
        .unwrap();

        for task in graph.tasks() {
            let layer = graph.layer_of(&task.id).unwrap();
            for dep in &task.depends_on {
                assert!(graph.layer_of(dep).unwrap() < layer);
            }
        }
    }

    #[test]
    fn extend_places_new_tasks_after_the_given_layer() {
        let graph = TaskGraph::new(vec![tool("a"), tool("b").depends_on(["a"])]).unwrap();

        // An independent task would naturally land in layer 0; the floor
        // forces it past the already-executed prefix.
        let extended = graph
            .extend(vec![tool("audit"), tool("report").depends_on(["audit"])], 1)
            .unwrap();

        assert_eq!(extended.layer_of("a"), Some(0));
        assert_eq!(extended.layer_of("b"), Some(1));
        assert_eq!(extended.layer_of("audit"), Some(2));
        assert_eq!(extended.layer_of("report"), Some(3));
    }

    #[test]
    fn extend_rejects_duplicate_ids() {
        let graph = TaskGraph::new(vec![tool("a")]).unwrap();
        let err = graph.extend(vec![tool("a")], 0).unwrap_err();
        assert!(matches!(err, Error::DuplicateTask(_)));
    }

    #[test]
    fn extend_keeps_original_graph_untouched() {
        let graph = TaskGraph::new(vec![tool("a")]).unwrap();
        let extended = graph.extend(vec![tool("b").depends_on(["a"])], 0).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn transitive_dependents_cover_the_whole_downstream_cone() {
        let graph = TaskGraph::new(vec![
            tool("a"),
            tool("b").depends_on(["a"]),
            tool("c").depends_on(["b"]),
            tool("d").depends_on(["a"]),
            tool("unrelated"),
        ])
        .unwrap();

        let ids: Vec<&str> = graph
            .transitive_dependents_of("a")
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }
}
