//! Core data types for the taskdeps graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned task identifier.
pub type TaskId = i64;

/// Store-assigned group identifier.
pub type GroupId = i64;

/// Maximum length of task and group names.
pub const MAX_NAME_LEN: usize = 500;

/// A unit of work that may depend on other tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier assigned by the store
    pub id: TaskId,

    /// Short description of the work
    pub name: String,

    /// Derived completion state
    pub state: TaskState,

    /// Owning group, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,

    /// When created
    pub created_at: DateTime<Utc>,

    /// Last modification
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Returns a copy of this task in the given state.
    pub fn with_state(&self, state: TaskState) -> Task {
        Task {
            state,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Validate the task's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)
    }
}

/// Task states.
///
/// Only `Complete` is ever set by a caller. `Locked` and `Incomplete` are a
/// projection of the task's direct dependencies that the engine keeps current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not complete, and every direct dependency is complete
    Incomplete,

    /// Not complete, and at least one direct dependency is not complete
    Locked,

    /// Explicitly completed
    Complete,
}

impl TaskState {
    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Incomplete => "incomplete",
            TaskState::Locked => "locked",
            TaskState::Complete => "complete",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, TaskState::Complete)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "incomplete" => Ok(TaskState::Incomplete),
            "locked" => Ok(TaskState::Locked),
            "complete" => Ok(TaskState::Complete),
            other => Err(format!("unknown task state '{}'", other)),
        }
    }
}

/// An organizational grouping of tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Validate the group's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)
    }
}

/// A dependency edge: `from_id` cannot complete until `to_id` is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    /// The task that has the dependency
    pub from_id: TaskId,

    /// The task being depended on
    pub to_id: TaskId,
}

impl Dependency {
    pub fn new(from_id: TaskId, to_id: TaskId) -> Self {
        Self { from_id, to_id }
    }
}

/// A task together with its direct neighbours in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,

    /// Tasks this task directly depends on
    pub dependencies: Vec<Task>,

    /// Tasks that directly depend on this task
    pub dependents: Vec<Task>,
}

/// A group together with the tasks assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: Group,
    pub tasks: Vec<Task>,
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,

    /// Case-sensitive substring of the task name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: TaskState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn name_contains(mut self, substring: impl Into<String>) -> Self {
        self.name_contains = Some(substring.into());
        self
    }

    /// Check a task against this filter.
    pub fn matches(&self, task: &Task) -> bool {
        self.state.is_none_or(|s| task.state == s)
            && self.group_id.is_none_or(|g| task.group_id == Some(g))
            && self
                .name_contains
                .as_deref()
                .is_none_or(|needle| task.name.contains(needle))
    }
}

/// Validation errors for tasks and groups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name cannot be empty")]
    EmptyName,
    #[error("name exceeds 500 characters")]
    NameTooLong,
    #[error("name contains control characters")]
    InvalidCharacters,
}

/// Name rules shared by tasks and groups.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}
