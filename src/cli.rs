//! CLI argument parsing for taskdeps.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "td",
    about = "Task tracking with dependency-ordered completion",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/taskdeps/logs/taskdeps.log"
)]
pub struct Cli {
    /// Directory holding the .taskdeps store (default: current directory)
    #[arg(short = 'd', long, global = true, env = "TASKDEPS_DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new store in the current directory
    Init,

    /// Create a new task
    Create {
        /// Task name
        name: String,

        /// Group to create the task in
        #[arg(short, long)]
        group: Option<i64>,
    },

    /// Show a task with its dependencies and dependents
    Get {
        /// Task ID
        id: i64,
    },

    /// List tasks
    List {
        /// Filter by state (incomplete, locked, complete)
        #[arg(short, long)]
        state: Option<String>,

        /// Only tasks in this group
        #[arg(short, long)]
        group: Option<i64>,

        /// Only tasks whose name contains this text
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Rename a task
    Rename {
        /// Task ID
        id: i64,

        /// New name
        name: String,
    },

    /// Mark a task complete
    Complete {
        /// Task ID
        id: i64,
    },

    /// Mark a completed task incomplete again
    Reopen {
        /// Task ID
        id: i64,
    },

    /// Delete a task and its dependency edges
    Delete {
        /// Task ID
        id: i64,
    },

    /// Make a task depend on another
    Depend {
        /// Task that gains the dependency
        task_id: i64,

        /// Task that must be completed first
        dependency_id: i64,
    },

    /// Show everything a task depends on, in completion order
    Order {
        /// Task ID
        id: i64,
    },

    /// Report tasks whose state disagrees with their dependencies
    Check,

    /// Manage task groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Run the daemon in foreground
    Daemon,

    /// Stop the running daemon
    DaemonStop,

    /// Check daemon status
    DaemonStatus,
}

#[derive(Subcommand)]
pub enum GroupCommand {
    /// Create a group, optionally moving a task into it
    Create {
        /// Group name
        name: String,

        /// Task to move into the new group
        #[arg(short, long)]
        task: Option<i64>,
    },

    /// Show a group and its tasks
    Get {
        /// Group ID
        id: i64,
    },

    /// List groups
    List,

    /// Rename a group
    Rename {
        /// Group ID
        id: i64,

        /// New name
        name: String,
    },

    /// Delete a group, keeping its tasks
    Delete {
        /// Group ID
        id: i64,
    },

    /// Move a task into a group
    Assign {
        /// Group ID
        group_id: i64,

        /// Task ID
        task_id: i64,
    },
}
