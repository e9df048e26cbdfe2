//! Client for connecting to the taskdeps daemon.
//!
//! Error responses are returned as [`RemoteError`] reports, so callers can
//! recover the status code with `downcast_ref::<RemoteError>()`.

use crate::daemon::{DaemonConfig, is_daemon_running, start_daemon};
use crate::protocol::{RemoteError, Request, Response};
use crate::types::{Dependency, Group, GroupId, GroupView, Task, TaskId, TaskState, TaskView};
use eyre::{Context, Result, bail, eyre};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

fn unexpected(response: Response) -> eyre::Report {
    match response {
        Response::Error { status, message } => eyre!(RemoteError { status, message }),
        other => eyre!("Unexpected response: {:?}", other),
    }
}

/// Client for communicating with the taskdeps daemon.
pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Connect to the daemon, optionally auto-starting it if not running.
    pub fn connect(root: &Path, auto_start: bool) -> Result<Self> {
        let config = DaemonConfig::new(root);
        let socket_path = config.socket_path();

        let stream = match UnixStream::connect(&socket_path) {
            Ok(stream) => stream,
            Err(_) if auto_start => {
                if !is_daemon_running(root) {
                    start_daemon(root).context("Failed to auto-start daemon")?;

                    let mut attempts = 0;
                    loop {
                        if attempts > 20 {
                            bail!("Daemon failed to start in time");
                        }
                        std::thread::sleep(Duration::from_millis(50));
                        if let Ok(stream) = UnixStream::connect(&socket_path) {
                            break stream;
                        }
                        attempts += 1;
                    }
                } else {
                    UnixStream::connect(&socket_path).context("Failed to connect to daemon")?
                }
            }
            Err(e) => {
                bail!("Failed to connect to daemon: {}. Is it running?", e);
            }
        };

        stream
            .set_read_timeout(Some(config.request_timeout))
            .context("Failed to set read timeout")?;

        Ok(Self { stream })
    }

    /// Send a request and receive a response.
    fn request(&mut self, request: Request) -> Result<Response> {
        let request_json = serde_json::to_string(&request)?;
        writeln!(self.stream, "{}", request_json)?;
        self.stream.flush()?;

        let mut reader = BufReader::new(&self.stream);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .context("Failed to read daemon response")?;

        let response: Response = serde_json::from_str(&response_line).context("Failed to parse daemon response")?;
        Ok(response)
    }

    fn task(&mut self, request: Request) -> Result<Task> {
        match self.request(request)? {
            Response::Task { task } => Ok(task),
            other => Err(unexpected(other)),
        }
    }

    fn tasks(&mut self, request: Request) -> Result<Vec<Task>> {
        match self.request(request)? {
            Response::Tasks { tasks } => Ok(tasks),
            other => Err(unexpected(other)),
        }
    }

    fn group_view(&mut self, request: Request) -> Result<GroupView> {
        match self.request(request)? {
            Response::GroupView { view } => Ok(view),
            other => Err(unexpected(other)),
        }
    }

    fn group(&mut self, request: Request) -> Result<Group> {
        match self.request(request)? {
            Response::Group { group } => Ok(group),
            other => Err(unexpected(other)),
        }
    }

    /// Create a new task.
    pub fn create(&mut self, name: &str, group_id: Option<GroupId>) -> Result<Task> {
        self.task(Request::CreateTask {
            name: name.to_string(),
            group_id,
        })
    }

    /// Get a task with its dependencies and dependents.
    pub fn get(&mut self, id: TaskId) -> Result<TaskView> {
        match self.request(Request::GetTask { id })? {
            Response::TaskView { view } => Ok(view),
            other => Err(unexpected(other)),
        }
    }

    /// List tasks with optional state filter.
    pub fn list(&mut self, state: Option<TaskState>) -> Result<Vec<Task>> {
        self.tasks(Request::ListTasks { state })
    }

    pub fn rename(&mut self, id: TaskId, name: &str) -> Result<Task> {
        self.task(Request::RenameTask {
            id,
            name: name.to_string(),
        })
    }

    pub fn complete(&mut self, id: TaskId) -> Result<Task> {
        self.task(Request::CompleteTask { id })
    }

    pub fn reopen(&mut self, id: TaskId) -> Result<Task> {
        self.task(Request::ReopenTask { id })
    }

    pub fn delete(&mut self, id: TaskId) -> Result<Task> {
        self.task(Request::DeleteTask { id })
    }

    /// Make `from_id` depend on `to_id`.
    pub fn add_dependency(&mut self, from_id: TaskId, to_id: TaskId) -> Result<Dependency> {
        match self.request(Request::AddDependency { from_id, to_id })? {
            Response::Dependency { dependency } => Ok(dependency),
            other => Err(unexpected(other)),
        }
    }

    /// Transitive dependencies of a task in completion order.
    pub fn topological_order(&mut self, id: TaskId) -> Result<Vec<Task>> {
        self.tasks(Request::TopologicalOrder { id })
    }

    pub fn create_group(&mut self, name: &str) -> Result<Group> {
        self.group(Request::CreateGroup { name: name.to_string() })
    }

    pub fn create_group_from_task(&mut self, name: &str, task_id: TaskId) -> Result<GroupView> {
        self.group_view(Request::CreateGroupFromTask {
            name: name.to_string(),
            task_id,
        })
    }

    pub fn get_group(&mut self, id: GroupId) -> Result<GroupView> {
        self.group_view(Request::GetGroup { id })
    }

    pub fn list_groups(&mut self) -> Result<Vec<Group>> {
        match self.request(Request::ListGroups)? {
            Response::Groups { groups } => Ok(groups),
            other => Err(unexpected(other)),
        }
    }

    pub fn rename_group(&mut self, id: GroupId, name: &str) -> Result<Group> {
        self.group(Request::RenameGroup {
            id,
            name: name.to_string(),
        })
    }

    pub fn delete_group(&mut self, id: GroupId) -> Result<Group> {
        self.group(Request::DeleteGroup { id })
    }

    pub fn assign_task(&mut self, group_id: GroupId, task_id: TaskId) -> Result<GroupView> {
        self.group_view(Request::AssignTask { group_id, task_id })
    }

    /// Shutdown the daemon.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.request(Request::Shutdown)? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Ping the daemon.
    pub fn ping(&mut self) -> Result<()> {
        match self.request(Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
