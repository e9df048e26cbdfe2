//! taskdeps: task tracking with a dependency graph.
//!
//! Tasks can depend on one another. The graph is kept acyclic, and every
//! task's state (`incomplete`, `locked` or `complete`) is kept consistent with
//! the state of its dependencies as tasks are completed, reopened and deleted.
//!
//! # Example
//!
//! ```no_run
//! use taskdeps::{Store, TaskState};
//! use std::path::Path;
//!
//! // Initialize a new store
//! let mut store = Store::init(Path::new(".")).unwrap();
//!
//! // Create tasks
//! let deploy = store.create("Deploy", None).unwrap();
//! let build = store.create("Build", None).unwrap();
//!
//! // Deploy cannot complete until Build is complete
//! store.add_dependency(deploy.id, build.id).unwrap();
//! assert_eq!(store.get(deploy.id).unwrap().unwrap().state, TaskState::Locked);
//!
//! // Completing Build unblocks Deploy
//! store.complete(build.id).unwrap();
//! assert_eq!(store.get(deploy.id).unwrap().unwrap().state, TaskState::Incomplete);
//! ```

mod groups;
mod memory;
mod query;
mod storage;
mod store;
mod types;

pub mod client;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod graph_store;
pub mod protocol;

// Re-export public API
pub use client::Client;
pub use daemon::{Daemon, DaemonConfig, is_daemon_running, start_daemon};
pub use error::GraphError;
pub use graph_store::GraphStore;
pub use groups::StoreGroupExt;
pub use memory::MemoryStorage;
pub use protocol::{RemoteError, Request, Response};
pub use query::{Query, StoreQueryExt};
pub use storage::Storage;
pub use store::Store;
pub use types::{
    Dependency, Filter, Group, GroupId, GroupView, MAX_NAME_LEN, Task, TaskId, TaskState, TaskView, ValidationError,
    validate_name,
};
