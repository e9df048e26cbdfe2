//! In-memory graph store.
//!
//! Ordered maps keep every query deterministic. Forward and reverse adjacency
//! are both indexed so dependents and dependencies are cheap to walk.
//! Transactions snapshot the whole store and restore it on error.

use crate::graph_store::GraphStore;
use crate::types::{Dependency, Filter, Group, GroupId, Task, TaskId};
use eyre::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};

/// Ephemeral storage for tests and short-lived sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tasks: BTreeMap<TaskId, Task>,
    groups: BTreeMap<GroupId, Group>,
    /// from -> {to}
    forward: BTreeMap<TaskId, BTreeSet<TaskId>>,
    /// to -> {from}
    reverse: BTreeMap<TaskId, BTreeSet<TaskId>>,
    last_task_id: TaskId,
    last_group_id: GroupId,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    /// Every edge, ordered by (from, to).
    pub fn edges(&self) -> Vec<Dependency> {
        self.forward
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| Dependency::new(from, to)))
            .collect()
    }

    fn tasks_for(&self, ids: Option<&BTreeSet<TaskId>>) -> Vec<Task> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id).cloned())
            .collect()
    }
}

impl GraphStore for MemoryStorage {
    fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(&id).cloned())
    }

    fn dependents(&self, id: TaskId) -> Result<Vec<Task>> {
        Ok(self.tasks_for(self.reverse.get(&id)))
    }

    fn dependencies(&self, id: TaskId) -> Result<Vec<Task>> {
        Ok(self.tasks_for(self.forward.get(&id)))
    }

    fn dependency_ids(&self, id: TaskId) -> Result<Vec<TaskId>> {
        Ok(self
            .forward
            .get(&id)
            .map(|tos| tos.iter().copied().collect())
            .unwrap_or_default())
    }

    fn insert_task(&mut self, task: &Task) -> Result<Task> {
        self.last_task_id += 1;
        let task = Task {
            id: self.last_task_id,
            ..task.clone()
        };
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn save_tasks(&mut self, batch: &[Task]) -> Result<()> {
        for task in batch {
            match self.tasks.get_mut(&task.id) {
                Some(slot) => *slot = task.clone(),
                None => bail!("Cannot save unknown task {}", task.id),
            }
        }
        Ok(())
    }

    fn delete_task(&mut self, id: TaskId) -> Result<()> {
        self.tasks.remove(&id);
        Ok(())
    }

    fn insert_edge(&mut self, edge: &Dependency) -> Result<()> {
        if !self.tasks.contains_key(&edge.from_id) || !self.tasks.contains_key(&edge.to_id) {
            bail!("Edge {} -> {} references an unknown task", edge.from_id, edge.to_id);
        }
        self.forward.entry(edge.from_id).or_default().insert(edge.to_id);
        self.reverse.entry(edge.to_id).or_default().insert(edge.from_id);
        Ok(())
    }

    fn delete_edges_incident(&mut self, id: TaskId) -> Result<usize> {
        let mut removed = 0;

        for to in self.forward.remove(&id).unwrap_or_default() {
            if let Some(froms) = self.reverse.get_mut(&to) {
                froms.remove(&id);
            }
            removed += 1;
        }
        for from in self.reverse.remove(&id).unwrap_or_default() {
            if let Some(tos) = self.forward.get_mut(&from) {
                tos.remove(&id);
            }
            removed += 1;
        }

        Ok(removed)
    }

    fn find_edge(&self, from_id: TaskId, to_id: TaskId) -> Result<Option<Dependency>> {
        let exists = self.forward.get(&from_id).is_some_and(|tos| tos.contains(&to_id));
        Ok(exists.then(|| Dependency::new(from_id, to_id)))
    }

    fn list_tasks(&self, filter: &Filter) -> Result<Vec<Task>> {
        Ok(self.tasks.values().filter(|t| filter.matches(t)).cloned().collect())
    }

    fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        Ok(self.groups.get(&id).cloned())
    }

    fn insert_group(&mut self, group: &Group) -> Result<Group> {
        self.last_group_id += 1;
        let group = Group {
            id: self.last_group_id,
            ..group.clone()
        };
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn save_group(&mut self, group: &Group) -> Result<()> {
        match self.groups.get_mut(&group.id) {
            Some(slot) => *slot = group.clone(),
            None => bail!("Cannot save unknown group {}", group.id),
        }
        Ok(())
    }

    fn delete_group(&mut self, id: GroupId) -> Result<()> {
        self.groups.remove(&id);
        Ok(())
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(self.groups.values().cloned().collect())
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}
