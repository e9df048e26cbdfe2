//! Graph-rule violations surfaced to callers.
//!
//! Store operations return [`eyre::Result`]. When an operation is rejected
//! because of the request itself, the report wraps a [`GraphError`] that can be
//! recovered with `report.downcast_ref::<GraphError>()`. Anything else is a
//! storage failure.

use crate::types::{GroupId, TaskId, ValidationError};

/// Errors caused by an invalid request against the task graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Group not found.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    /// A task cannot depend on itself.
    #[error("a task cannot depend on itself")]
    SelfDependency,

    /// Adding this dependency would create a cycle.
    #[error("task {from} depending on task {to} would create a cycle")]
    CycleDetected { from: TaskId, to: TaskId },

    /// Completed tasks may not gain new dependencies.
    #[error("task {0} is complete and cannot gain new dependencies")]
    CompletedTaskImmutable(TaskId),

    /// Locked tasks cannot be completed until their dependencies are.
    #[error("task {0} is locked by incomplete dependencies")]
    TaskLocked(TaskId),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl GraphError {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GraphError::TaskNotFound(_) | GraphError::GroupNotFound(_) => 404,
            GraphError::SelfDependency | GraphError::CycleDetected { .. } | GraphError::Validation(_) => 400,
            GraphError::CompletedTaskImmutable(_) | GraphError::TaskLocked(_) => 409,
        }
    }
}
