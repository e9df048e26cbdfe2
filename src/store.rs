//! High-level store API for taskdeps.
//!
//! [`Store`] is the task service: it validates input, opens one transaction per
//! mutation and hands graph work to the [`engine`](crate::engine).

use crate::engine;
use crate::error::GraphError;
use crate::graph_store::GraphStore;
use crate::memory::MemoryStorage;
use crate::storage::Storage;
use crate::types::{Dependency, Filter, GroupId, Task, TaskId, TaskState, TaskView, validate_name};
use chrono::Utc;
use eyre::{Context, Result, eyre};
use std::path::Path;

/// The main taskdeps store.
pub struct Store<B: GraphStore = Storage> {
    backend: B,
}

impl Store<Storage> {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let storage = Storage::init(root)?;
        log::info!("Initialized store in {}", root.display());
        Ok(Self::with_backend(storage))
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let storage = Storage::open(root)?;
        Ok(Self::with_backend(storage))
    }
}

impl Store<MemoryStorage> {
    /// Create an empty store that lives only in memory.
    pub fn in_memory() -> Self {
        Self::with_backend(MemoryStorage::new())
    }
}

impl<B: GraphStore> Store<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Access the underlying graph store.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Create a new task, optionally inside a group.
    pub fn create(&mut self, name: &str, group_id: Option<GroupId>) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: 0,
            name: name.to_string(),
            state: TaskState::Incomplete,
            group_id,
            created_at: now,
            updated_at: now,
        };
        task.validate().map_err(|e| eyre!(GraphError::from(e)))?;

        let task = self.backend.transaction(|store| {
            if let Some(group_id) = group_id
                && store.get_group(group_id)?.is_none()
            {
                return Err(eyre!(GraphError::GroupNotFound(group_id)));
            }
            store.insert_task(&task)
        })?;

        log::info!("Created task {} '{}'", task.id, task.name);
        Ok(task)
    }

    /// Get a task by ID.
    pub fn get(&self, id: TaskId) -> Result<Option<Task>> {
        self.backend.get_task(id)
    }

    /// Get a task with its direct dependencies and dependents.
    pub fn view(&self, id: TaskId) -> Result<TaskView> {
        let task = engine::require_task(&self.backend, id)?;
        Ok(TaskView {
            dependencies: self.backend.dependencies(id)?,
            dependents: self.backend.dependents(id)?,
            task,
        })
    }

    /// Rename a task. State and dependencies are untouched.
    pub fn rename(&mut self, id: TaskId, name: &str) -> Result<Task> {
        validate_name(name).map_err(|e| eyre!(GraphError::from(e)))?;

        self.backend.transaction(|store| {
            let existing = engine::require_task(store, id)?;
            let renamed = Task {
                name: name.to_string(),
                updated_at: Utc::now(),
                ..existing
            };
            store.save_tasks(std::slice::from_ref(&renamed))?;
            Ok(renamed)
        })
    }

    /// Mark a task complete, unblocking its dependents.
    pub fn complete(&mut self, id: TaskId) -> Result<Task> {
        let task = self.backend.transaction(|store| engine::mark_complete(store, id))?;
        log::info!("Task {} is {}", id, task.state);
        Ok(task)
    }

    /// Reopen a task, locking everything completed on top of it.
    pub fn reopen(&mut self, id: TaskId) -> Result<Task> {
        let task = self.backend.transaction(|store| engine::mark_incomplete(store, id))?;
        log::info!("Task {} is {}", id, task.state);
        Ok(task)
    }

    /// Delete a task and all of its dependency edges.
    pub fn delete(&mut self, id: TaskId) -> Result<Task> {
        let task = self.backend.transaction(|store| engine::delete_task(store, id))?;
        log::info!("Deleted task {} '{}'", task.id, task.name);
        Ok(task)
    }

    /// Make `task_id` depend on `dependency_id`.
    pub fn add_dependency(&mut self, task_id: TaskId, dependency_id: TaskId) -> Result<Dependency> {
        let edge = self
            .backend
            .transaction(|store| engine::add_dependency(store, task_id, dependency_id))?;
        log::info!("Task {} depends on {}", edge.from_id, edge.to_id);
        Ok(edge)
    }

    /// Tasks that `id` directly depends on.
    pub fn dependencies(&self, id: TaskId) -> Result<Vec<Task>> {
        engine::require_task(&self.backend, id)?;
        self.backend.dependencies(id)
    }

    /// Tasks that directly depend on `id`.
    pub fn dependents(&self, id: TaskId) -> Result<Vec<Task>> {
        engine::require_task(&self.backend, id)?;
        self.backend.dependents(id)
    }

    /// Every task `id` transitively depends on, in completion order.
    pub fn topological_order(&self, id: TaskId) -> Result<Vec<Task>> {
        engine::topological_order(&self.backend, id)
    }

    /// List tasks with optional state filter.
    pub fn list(&self, state_filter: Option<TaskState>) -> Result<Vec<Task>> {
        let filter = Filter {
            state: state_filter,
            ..Filter::default()
        };
        self.backend.list_tasks(&filter)
    }

    /// IDs of tasks whose stored state disagrees with their dependencies.
    pub fn verify(&self) -> Result<Vec<TaskId>> {
        engine::inconsistent_tasks(&self.backend).context("Failed to verify task states")
    }
}
