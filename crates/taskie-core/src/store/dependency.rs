//! Dependency graph between held tasks.
//!
//! - Forward edges: task -> tasks it waits for
//! - Reverse edges: task -> tasks waiting for it
//! - Invariant: edges and reverse_edges are kept in sync

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::domain::TaskKey;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: HashMap<TaskKey, HashSet<TaskKey>>,

    /// Answers "who is waiting for this task?" without a scan.
    reverse_edges: HashMap<TaskKey, HashSet<TaskKey>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `task` waits for `depends_on`.
    pub fn add_dependency(&mut self, task: TaskKey, depends_on: TaskKey) {
        self.edges.entry(task).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(task);
    }

    pub fn remove_dependency(&mut self, task: TaskKey, depends_on: TaskKey) {
        if let Entry::Occupied(mut e) = self.edges.entry(task) {
            e.get_mut().remove(&depends_on);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        if let Entry::Occupied(mut e) = self.reverse_edges.entry(depends_on) {
            e.get_mut().remove(&task);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
    }

    /// Drop every edge touching `task` and return the tasks that were waiting
    /// for it. Callers decide which of them became ready.
    pub fn remove_task(&mut self, task: TaskKey) -> Vec<TaskKey> {
        for dep in self.get_dependencies(task) {
            self.remove_dependency(task, dep);
        }
        let waiting = self.get_waiting_tasks(task);
        for &waiter in &waiting {
            self.remove_dependency(waiter, task);
        }
        waiting
    }

    /// Every task waiting for `completed`, including ones that still have
    /// other dependencies.
    pub fn get_waiting_tasks(&self, completed: TaskKey) -> Vec<TaskKey> {
        self.reverse_edges
            .get(&completed)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_dependencies(&self, task: TaskKey) -> bool {
        self.edges
            .get(&task)
            .map(|deps| !deps.is_empty())
            .unwrap_or(false)
    }

    pub fn get_dependencies(&self, task: TaskKey) -> Vec<TaskKey> {
        self.edges
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Return the nodes of one cycle, or `None` when the graph is a DAG.
    ///
    /// Three-colour DFS over forward edges, O(V + E). The returned path starts
    /// and ends on the same node.
    pub fn detect_cycle(&self) -> Option<Vec<TaskKey>> {
        let mut starts: Vec<TaskKey> = self.edges.keys().copied().collect();
        starts.sort();
        self.detect_cycle_from(starts)
    }

    /// Like [`detect_cycle`](Self::detect_cycle), but only explores what is
    /// reachable from `starts`.
    pub fn detect_cycle_from(
        &self,
        starts: impl IntoIterator<Item = TaskKey>,
    ) -> Option<Vec<TaskKey>> {
        let mut colors: HashMap<TaskKey, Color> = HashMap::new();

        for start in starts {
            if colors.contains_key(&start) {
                continue;
            }
            let mut path = Vec::new();
            if let Some(cycle) = self.dfs_cycle(start, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: TaskKey,
        colors: &mut HashMap<TaskKey, Color>,
        path: &mut Vec<TaskKey>,
    ) -> Option<Vec<TaskKey>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for dep in self.get_dependencies(node) {
            match colors.get(&dep) {
                Some(Color::Gray) => {
                    let from = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = path[from..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Some(Color::Black) => {}
                None => {
                    if let Some(cycle) = self.dfs_cycle(dep, colors, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        colors.insert(node, Color::Black);
        path.pop();
        None
    }
}
