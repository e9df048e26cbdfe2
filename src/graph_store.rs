//! The storage boundary the dependency engine runs against.
//!
//! Implementations only move rows around. They never derive task state; that
//! is the engine's job. Every multi-step mutation is wrapped in
//! [`GraphStore::transaction`], which must either apply all writes made by the
//! closure or none of them, and must keep concurrent writers from interleaving.

use crate::types::{Dependency, Filter, Group, GroupId, Task, TaskId};
use eyre::Result;

/// Adjacency and point-lookup queries over tasks, groups and dependency edges.
pub trait GraphStore {
    /// Get a task by ID.
    fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Tasks that directly depend on `id` (edges where `to_id == id`), ordered by ID.
    fn dependents(&self, id: TaskId) -> Result<Vec<Task>>;

    /// Tasks that `id` directly depends on (edges where `from_id == id`), ordered by ID.
    fn dependencies(&self, id: TaskId) -> Result<Vec<Task>>;

    /// IDs of the tasks that `id` directly depends on, ordered.
    fn dependency_ids(&self, id: TaskId) -> Result<Vec<TaskId>>;

    /// Persist a new task and return it with its assigned ID.
    ///
    /// The `id` field of `task` is ignored.
    fn insert_task(&mut self, task: &Task) -> Result<Task>;

    /// Overwrite existing tasks.
    fn save_tasks(&mut self, batch: &[Task]) -> Result<()>;

    /// Remove a task row. Edges must already be gone.
    fn delete_task(&mut self, id: TaskId) -> Result<()>;

    fn insert_edge(&mut self, edge: &Dependency) -> Result<()>;

    /// Remove every edge with `id` at either end. Returns how many were removed.
    fn delete_edges_incident(&mut self, id: TaskId) -> Result<usize>;

    fn find_edge(&self, from_id: TaskId, to_id: TaskId) -> Result<Option<Dependency>>;

    /// All tasks matching `filter`, ordered by ID.
    fn list_tasks(&self, filter: &Filter) -> Result<Vec<Task>>;

    fn get_group(&self, id: GroupId) -> Result<Option<Group>>;

    /// Persist a new group and return it with its assigned ID.
    fn insert_group(&mut self, group: &Group) -> Result<Group>;

    fn save_group(&mut self, group: &Group) -> Result<()>;

    /// Remove a group row. Member tasks must already be detached.
    fn delete_group(&mut self, id: GroupId) -> Result<()>;

    /// All groups, ordered by ID.
    fn list_groups(&self) -> Result<Vec<Group>>;

    /// Tasks assigned to a group, ordered by ID.
    fn group_tasks(&self, id: GroupId) -> Result<Vec<Task>> {
        self.list_tasks(&Filter::new().group(id))
    }

    /// Run `f` atomically. On `Err` every write made by `f` is discarded.
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>;
}
