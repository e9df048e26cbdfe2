//! Shared test infrastructure for taskdeps integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use taskdeps::{Dependency, GraphError, Store, Task, TaskId, TaskState};
use tempfile::TempDir;

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::init(temp_dir.path()).expect("Failed to init store");
        Self { temp_dir, store }
    }

    /// Create a task outside any group.
    pub fn create_task(&mut self, name: &str) -> Task {
        self.store.create(name, None).expect("Failed to create task")
    }

    /// Create `len` tasks where each one depends on the next.
    ///
    /// Returns them head first, so the last task is the only unlocked one.
    pub fn create_chain(&mut self, len: usize) -> Vec<Task> {
        let tasks: Vec<Task> = (0..len).map(|i| self.create_task(&format!("Task {}", i))).collect();
        for pair in tasks.windows(2) {
            self.depend(&pair[0], &pair[1]);
        }
        tasks
    }

    /// Make `from` depend on `to`.
    pub fn depend(&mut self, from: &Task, to: &Task) -> Dependency {
        self.store
            .add_dependency(from.id, to.id)
            .expect("Failed to add dependency")
    }

    pub fn complete(&mut self, task: &Task) -> Task {
        self.store.complete(task.id).expect("Failed to complete task")
    }

    pub fn reopen(&mut self, task: &Task) -> Task {
        self.store.reopen(task.id).expect("Failed to reopen task")
    }

    /// Current stored state of a task.
    pub fn state_of(&self, task: &Task) -> TaskState {
        self.store
            .get(task.id)
            .expect("Failed to get task")
            .expect("Task not found")
            .state
    }

    /// IDs of a task's transitive dependencies in completion order.
    pub fn order_ids(&self, task: &Task) -> Vec<TaskId> {
        self.store
            .topological_order(task.id)
            .expect("Failed to order dependencies")
            .into_iter()
            .map(|t| t.id)
            .collect()
    }

    /// Assert that every task's state agrees with its dependencies.
    pub fn assert_consistent(&self) {
        let inconsistent = self.store.verify().expect("Failed to verify store");
        assert!(inconsistent.is_empty(), "Inconsistent task states: {:?}", inconsistent);
    }

    /// Get all tasks count.
    pub fn total_count(&self) -> usize {
        self.store.list(None).expect("Failed to list tasks").len()
    }

    pub fn count_by_state(&self, state: TaskState) -> usize {
        self.store.list(Some(state)).expect("Failed to list tasks").len()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the graph error carried by a failed operation.
pub fn graph_error<T: std::fmt::Debug>(result: eyre::Result<T>) -> GraphError {
    let report = result.expect_err("Expected operation to fail");
    report
        .downcast_ref::<GraphError>()
        .cloned()
        .unwrap_or_else(|| panic!("Expected a graph error, got: {:#}", report))
}
