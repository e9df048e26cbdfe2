//! td - task tracking with dependency-ordered completion.

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use taskdeps::{
    Client, Daemon, DaemonConfig, Group, Store, StoreGroupExt, StoreQueryExt, Task, TaskState, is_daemon_running,
};

mod cli;

use cli::{Cli, Command, GroupCommand};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskdeps")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("taskdeps.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn format_state(state: TaskState) -> ColoredString {
    match state {
        TaskState::Incomplete => "incomplete".yellow(),
        TaskState::Locked => "locked".red(),
        TaskState::Complete => "complete".green(),
    }
}

fn print_task_line(task: &Task) {
    let group = task.group_id.map(|g| format!(" [group {}]", g)).unwrap_or_default();
    println!(
        "{} {} {}{}",
        format_state(task.state),
        task.id.to_string().cyan(),
        task.name,
        group.dimmed()
    );
}

fn print_group_line(group: &Group) {
    println!("{} {}", group.id.to_string().cyan(), group.name);
}

fn print_tasks(tasks: &[Task], empty: &str) {
    if tasks.is_empty() {
        println!("{}", empty.dimmed());
    } else {
        for task in tasks {
            print_task_line(task);
        }
    }
}

fn run_group(store_dir: &Path, command: GroupCommand) -> Result<()> {
    let mut store = Store::open(store_dir).context("Failed to open store")?;

    match command {
        GroupCommand::Create { name, task } => {
            let group = match task {
                Some(task_id) => store
                    .create_group_from_task(&name, task_id)
                    .context("Failed to create group")?
                    .group,
                None => store.create_group(&name).context("Failed to create group")?,
            };
            println!("{} Created group: {} {}", "✓".green(), group.id.to_string().cyan(), group.name);
        }

        GroupCommand::Get { id } => {
            let view = store.get_group(id).context("Failed to get group")?;
            println!("{}: {}", "ID".bold(), view.group.id.to_string().cyan());
            println!("{}: {}", "Name".bold(), view.group.name);
            println!("{}: {}", "Created".bold(), view.group.created_at);
            println!("{}:", "Tasks".bold());
            for task in &view.tasks {
                print!("  ");
                print_task_line(task);
            }
        }

        GroupCommand::List => {
            let groups = store.list_groups().context("Failed to list groups")?;
            if groups.is_empty() {
                println!("{}", "No groups found".dimmed());
            }
            for group in &groups {
                print_group_line(group);
            }
        }

        GroupCommand::Rename { id, name } => {
            let group = store.rename_group(id, &name).context("Failed to rename group")?;
            println!("{} Renamed group: {} {}", "✓".green(), group.id.to_string().cyan(), group.name);
        }

        GroupCommand::Delete { id } => {
            let group = store.delete_group(id).context("Failed to delete group")?;
            println!("{} Deleted group: {} {}", "✓".green(), group.id.to_string().cyan(), group.name);
        }

        GroupCommand::Assign { group_id, task_id } => {
            let view = store.assign_task(group_id, task_id).context("Failed to assign task")?;
            println!(
                "{} Task {} is now in group {}",
                "✓".green(),
                task_id.to_string().cyan(),
                view.group.name
            );
        }
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);

    match cli.command {
        Command::Init => {
            Store::init(&store_dir).context("Failed to initialize store")?;
            println!("{} Initialized taskdeps store in {}", "✓".green(), store_dir.display());
        }

        Command::Create { name, group } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store.create(&name, group).context("Failed to create task")?;

            println!("{} Created: {} {}", "✓".green(), task.id.to_string().cyan(), task.name);
        }

        Command::Get { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let view = store.view(id).context("Failed to get task")?;

            println!("{}: {}", "ID".bold(), view.task.id.to_string().cyan());
            println!("{}: {}", "Name".bold(), view.task.name);
            println!("{}: {}", "State".bold(), format_state(view.task.state));
            if let Some(group_id) = view.task.group_id {
                println!("{}: {}", "Group".bold(), group_id);
            }
            println!("{}: {}", "Created".bold(), view.task.created_at);
            println!("{}: {}", "Updated".bold(), view.task.updated_at);
            if !view.dependencies.is_empty() {
                println!("{}:", "Depends on".bold());
                for task in &view.dependencies {
                    print!("  ");
                    print_task_line(task);
                }
            }
            if !view.dependents.is_empty() {
                println!("{}:", "Needed by".bold());
                for task in &view.dependents {
                    print!("  ");
                    print_task_line(task);
                }
            }
        }

        Command::List { state, group, name } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;

            let mut query = store.query();
            if let Some(state) = state {
                let state: TaskState = state.parse().map_err(|e: String| eyre!(e))?;
                query = query.state(state);
            }
            if let Some(group) = group {
                query = query.group(group);
            }
            if let Some(name) = name {
                query = query.name_contains(name);
            }

            let tasks = query.execute().context("Failed to list tasks")?;
            print_tasks(&tasks, "No tasks found");
        }

        Command::Rename { id, name } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store.rename(id, &name).context("Failed to rename task")?;

            println!("{} Renamed: {} {}", "✓".green(), task.id.to_string().cyan(), task.name);
        }

        Command::Complete { id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store.complete(id).context("Failed to complete task")?;

            println!("{} Completed: {} {}", "✓".green(), task.id.to_string().cyan(), task.name);

            let unblocked: Vec<Task> = store
                .dependents(id)?
                .into_iter()
                .filter(|t| t.state == TaskState::Incomplete)
                .collect();
            if !unblocked.is_empty() {
                println!("{} {} task(s) ready to work on:", "→".blue(), unblocked.len());
                for task in &unblocked {
                    println!("  {} {}", task.id.to_string().cyan(), task.name);
                }
            }
        }

        Command::Reopen { id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store.reopen(id).context("Failed to reopen task")?;

            println!("{} Reopened: {} {}", "→".blue(), task.id.to_string().cyan(), task.name);
        }

        Command::Delete { id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store.delete(id).context("Failed to delete task")?;

            println!("{} Deleted: {} {}", "✓".green(), task.id.to_string().cyan(), task.name);
        }

        Command::Depend { task_id, dependency_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            store
                .add_dependency(task_id, dependency_id)
                .context("Failed to add dependency")?;

            println!(
                "{} {} now depends on {}",
                "✓".green(),
                task_id.to_string().cyan(),
                dependency_id.to_string().cyan()
            );
        }

        Command::Order { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let tasks = store.topological_order(id).context("Failed to order dependencies")?;

            if tasks.is_empty() {
                println!("{}", "No dependencies".dimmed());
            } else {
                for (position, task) in tasks.iter().enumerate() {
                    print!("{:>3}. ", position + 1);
                    print_task_line(task);
                }
            }
        }

        Command::Check => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let inconsistent = store.verify()?;

            if inconsistent.is_empty() {
                println!("{} All task states are consistent", "✓".green());
            } else {
                println!("{} {} task(s) with inconsistent state:", "✗".red(), inconsistent.len());
                for id in &inconsistent {
                    println!("  {}", id.to_string().cyan());
                }
                std::process::exit(1);
            }
        }

        Command::Group(command) => run_group(&store_dir, command)?,

        Command::Daemon => {
            println!("{} Starting daemon for {}", "→".blue(), store_dir.display());

            let config = DaemonConfig::new(&store_dir);
            let mut daemon = Daemon::new(config).context("Failed to create daemon")?;

            let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
            rt.block_on(async { daemon.run().await }).context("Daemon error")?;
        }

        Command::DaemonStop => {
            if !is_daemon_running(&store_dir) {
                println!("{} Daemon is not running", "✗".red());
                std::process::exit(1);
            }

            let mut client = Client::connect(&store_dir, false).context("Failed to connect to daemon")?;
            client.shutdown().context("Failed to shutdown daemon")?;
            println!("{} Daemon stopped", "✓".green());
        }

        Command::DaemonStatus => {
            if is_daemon_running(&store_dir) {
                println!("{} Daemon is running", "✓".green());

                if let Ok(mut client) = Client::connect(&store_dir, false)
                    && client.ping().is_ok()
                {
                    println!("  {} Responding to requests", "✓".green());
                }
            } else {
                println!("{} Daemon is not running", "✗".red());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
