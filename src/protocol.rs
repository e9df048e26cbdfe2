//! IPC protocol types for daemon communication.
//!
//! One JSON object per line in each direction. Failed requests come back as
//! [`Response::Error`] carrying an HTTP-style status code.

use crate::error::GraphError;
use crate::types::{Dependency, Group, GroupId, GroupView, Task, TaskId, TaskState, TaskView};
use serde::{Deserialize, Serialize};

/// Request sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Create a new task.
    CreateTask { name: String, group_id: Option<GroupId> },

    /// Get a task with its neighbours.
    GetTask { id: TaskId },

    /// List tasks with optional state filter.
    ListTasks { state: Option<TaskState> },

    RenameTask { id: TaskId, name: String },

    CompleteTask { id: TaskId },

    ReopenTask { id: TaskId },

    DeleteTask { id: TaskId },

    /// Make `from_id` depend on `to_id`.
    AddDependency { from_id: TaskId, to_id: TaskId },

    /// Transitive dependencies of a task in completion order.
    TopologicalOrder { id: TaskId },

    CreateGroup { name: String },

    /// Create a group and move a task into it.
    CreateGroupFromTask { name: String, task_id: TaskId },

    GetGroup { id: GroupId },

    ListGroups,

    RenameGroup { id: GroupId, name: String },

    DeleteGroup { id: GroupId },

    AssignTask { group_id: GroupId, task_id: TaskId },

    /// Shutdown the daemon.
    Shutdown,

    /// Ping to check if daemon is alive.
    Ping,
}

/// Response sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Single task response.
    Task { task: Task },

    /// Task with dependencies and dependents.
    TaskView { view: TaskView },

    /// Multiple tasks response.
    Tasks { tasks: Vec<Task> },

    Dependency { dependency: Dependency },

    Group { group: Group },

    GroupView { view: GroupView },

    Groups { groups: Vec<Group> },

    /// Operation succeeded.
    Ok,

    /// Pong response to ping.
    Pong,

    /// Error response.
    Error { status: u16, message: String },
}

impl Response {
    /// Create an error response.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::Error {
            status,
            message: message.into(),
        }
    }

    /// Map a failed operation to an error response.
    ///
    /// Graph-rule violations keep their own status; anything else is a 500.
    pub fn from_report(report: &eyre::Report) -> Self {
        match report.downcast_ref::<GraphError>() {
            Some(err) => Self::error(err.status_code(), err.to_string()),
            None => Self::error(500, format!("{:#}", report)),
        }
    }
}

/// An error response received by the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct RemoteError {
    pub status: u16,
    pub message: String,
}

/// Parse one request line, producing a 400 response for anything malformed.
pub fn parse_request(line: &str) -> Result<Request, Response> {
    serde_json::from_str(line).map_err(|e| Response::error(400, format!("malformed request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::{WrapErr, eyre};

    #[test]
    fn test_request_serialization() {
        let req = Request::CreateTask {
            name: "Test".to_string(),
            group_id: Some(4),
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"CreateTask""#));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        if let Request::CreateTask { name, group_id } = parsed {
            assert_eq!(name, "Test");
            assert_eq!(group_id, Some(4));
        } else {
            panic!("Wrong request type");
        }
    }

    #[test]
    fn test_unit_request_parses() {
        assert!(matches!(parse_request(r#"{"type":"Ping"}"#), Ok(Request::Ping)));
        assert!(matches!(
            parse_request(r#"{"type":"ListTasks","state":"locked"}"#),
            Ok(Request::ListTasks {
                state: Some(TaskState::Locked)
            })
        ));
    }

    #[test]
    fn test_malformed_request_is_bad_request() {
        for line in ["not json", r#"{"type":"Explode"}"#, r#"{"type":"GetTask","id":"abc"}"#] {
            match parse_request(line) {
                Err(Response::Error { status, .. }) => assert_eq!(status, 400),
                other => panic!("expected 400 for {line}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::error(409, "test error");
        let json = serde_json::to_string(&resp).unwrap();

        assert!(json.contains("Error"));
        assert!(json.contains("409"));
        assert!(json.contains("test error"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (eyre!(GraphError::TaskNotFound(1)), 404),
            (eyre!(GraphError::SelfDependency), 400),
            (eyre!(GraphError::CycleDetected { from: 1, to: 2 }), 400),
            (eyre!(GraphError::TaskLocked(1)), 409),
            (eyre!(GraphError::CompletedTaskImmutable(1)), 409),
            (eyre!("disk on fire"), 500),
        ];

        for (report, expected) in cases {
            match Response::from_report(&report) {
                Response::Error { status, .. } => assert_eq!(status, expected),
                other => panic!("unexpected response {other:?}"),
            }
        }
    }

    #[test]
    fn test_status_survives_context() {
        let report: eyre::Result<()> = Err(eyre!(GraphError::GroupNotFound(3)));
        let report = report.wrap_err("Failed to load group").unwrap_err();

        match Response::from_report(&report) {
            Response::Error { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "group not found: 3");
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
}
