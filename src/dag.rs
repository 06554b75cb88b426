//! DAG Builder & Validator — component F.
//!
//! Links tasks by intersecting each task's `reads` with the set of ids
//! present in the suite, detects cycles, and computes transitive upstream
//! closures for `--dependencies` (spec.md §4.F). Cycle detection and
//! topological ordering both use Kahn's algorithm (BFS over in-degrees).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::SchedulerError;
use crate::task::{Task, TaskId};

/// The dependency graph over a suite's tasks.
///
/// `upstream[t]` and `downstream[t]` only contain edges to other tasks in
/// the suite — a `reads` entry for a table outside the suite is retained on
/// the `Task` itself but never becomes an edge (spec.md §3).
#[derive(Debug)]
pub struct Dag {
    tasks: HashMap<TaskId, Task>,
    upstream: HashMap<TaskId, Vec<TaskId>>,
    downstream: HashMap<TaskId, Vec<TaskId>>,
}

/// A dry-run summary produced by `--check` (spec.md §6): task/edge counts,
/// or the cycles that block execution.
#[derive(Debug)]
pub struct DagReport {
    pub task_count: usize,
    pub edge_count: usize,
    pub cycles: Vec<Vec<TaskId>>,
}

impl Dag {
    /// Build the DAG from a suite's tasks, validating cycles eagerly.
    pub fn build(tasks: Vec<Task>) -> Result<Self, SchedulerError> {
        let ids: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();

        let mut upstream: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut downstream: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut by_id = HashMap::new();

        for task in tasks {
            upstream.entry(task.id.clone()).or_default();
            downstream.entry(task.id.clone()).or_default();
            for read in &task.reads {
                if ids.contains(read) {
                    upstream.entry(task.id.clone()).or_default().push(read.clone());
                    downstream.entry(read.clone()).or_default().push(task.id.clone());
                }
            }
            by_id.insert(task.id.clone(), task);
        }

        let dag = Dag {
            tasks: by_id,
            upstream,
            downstream,
        };

        if let Err(cycles) = dag.topological_order() {
            return Err(SchedulerError::Cycle(cycles));
        }

        Ok(dag)
    }

    /// A dry-run report: task/edge counts and (if any) the blocking cycles.
    pub fn report(&self) -> DagReport {
        let edge_count: usize = self.upstream.values().map(Vec::len).sum();
        let cycles = self.topological_order().err().unwrap_or_default();
        DagReport {
            task_count: self.tasks.len(),
            edge_count,
            cycles,
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.keys()
    }

    pub fn upstream_of(&self, id: &TaskId) -> &[TaskId] {
        self.upstream.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn downstream_of(&self, id: &TaskId) -> &[TaskId] {
        self.downstream.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The transitive upstream closure of `roots`, including `roots`
    /// themselves — used to resolve `--dependencies` (spec.md §4.F).
    pub fn upstream_closure(&self, roots: &[TaskId]) -> HashSet<TaskId> {
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut stack: Vec<TaskId> = roots.to_vec();
        for r in roots {
            seen.insert(r.clone());
        }
        while let Some(id) = stack.pop() {
            for up in self.upstream_of(&id) {
                if seen.insert(up.clone()) {
                    stack.push(up.clone());
                }
            }
        }
        seen
    }

    /// The transitive downstream closure of `id`, excluding `id` itself.
    pub fn downstream_closure(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut stack: Vec<TaskId> = self.downstream_of(id).to_vec();
        while let Some(cur) = stack.pop() {
            if seen.insert(cur.clone()) {
                for down in self.downstream_of(&cur) {
                    stack.push(down.clone());
                }
            }
        }
        seen
    }

    /// Kahn's algorithm: BFS topological sort. `Err` carries the unresolved
    /// nodes regrouped into individual cycle paths.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, Vec<Vec<TaskId>>> {
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        for id in self.tasks.keys() {
            in_degree.entry(id.clone()).or_insert(0);
        }
        for targets in self.downstream.values() {
            for t in targets {
                *in_degree.entry(t.clone()).or_insert(0) += 1;
            }
        }

        let mut ready: Vec<TaskId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();
        let mut queue: VecDeque<TaskId> = ready.into();

        let mut result = Vec::with_capacity(self.tasks.len());
        while let Some(id) = queue.pop_front() {
            result.push(id.clone());
            if let Some(downstream) = self.downstream.get(&id) {
                let mut newly_ready = Vec::new();
                for d in downstream {
                    let deg = in_degree.get_mut(d).expect("node registered above");
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(d.clone());
                    }
                }
                newly_ready.sort();
                for d in newly_ready {
                    queue.push_back(d);
                }
            }
        }

        if result.len() < self.tasks.len() {
            let processed: HashSet<&TaskId> = result.iter().collect();
            let unresolved: Vec<TaskId> = self
                .tasks
                .keys()
                .filter(|id| !processed.contains(id))
                .cloned()
                .collect();
            Err(self.group_into_cycles(unresolved))
        } else {
            Ok(result)
        }
    }

    /// Regroup a set of mutually-cyclic nodes into individual cycle paths
    /// for user-facing error messages (spec.md S3: `[s.a, s.b, s.a]`).
    fn group_into_cycles(&self, unresolved: Vec<TaskId>) -> Vec<Vec<TaskId>> {
        let unresolved_set: HashSet<TaskId> = unresolved.iter().cloned().collect();
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut cycles = Vec::new();

        for start in &unresolved {
            if visited.contains(start) {
                continue;
            }
            let mut path = vec![start.clone()];
            let mut current = start.clone();
            loop {
                let next = self
                    .upstream_of(&current)
                    .iter()
                    .find(|u| unresolved_set.contains(u))
                    .cloned();
                let Some(next) = next else { break };
                visited.insert(current.clone());
                if let Some(pos) = path.iter().position(|n| *n == next) {
                    let mut cycle: Vec<TaskId> = path[pos..].to_vec();
                    cycle.push(next);
                    cycles.push(cycle);
                    break;
                }
                path.push(next.clone());
                current = next;
            }
            visited.insert(start.clone());
        }

        cycles
    }
}
