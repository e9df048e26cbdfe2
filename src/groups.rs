//! Task groups.
//!
//! Groups are purely organizational. Nothing here reads or writes task state
//! or dependency edges; tasks are only looked up to check they exist and to
//! move their `group_id`.

use crate::engine::require_task;
use crate::error::GraphError;
use crate::graph_store::GraphStore;
use crate::store::Store;
use crate::types::{Group, GroupId, GroupView, Task, TaskId, validate_name};
use chrono::Utc;
use eyre::{Result, eyre};

fn require_group<S: GraphStore>(store: &S, id: GroupId) -> Result<Group> {
    store
        .get_group(id)?
        .ok_or_else(|| eyre!(GraphError::GroupNotFound(id)))
}

fn move_task<S: GraphStore>(store: &mut S, task_id: TaskId, group_id: Option<GroupId>) -> Result<Task> {
    let task = require_task(store, task_id)?;
    let moved = Task {
        group_id,
        updated_at: Utc::now(),
        ..task
    };
    store.save_tasks(std::slice::from_ref(&moved))?;
    Ok(moved)
}

/// Extension trait adding group management to Store.
pub trait StoreGroupExt {
    /// Create an empty group.
    fn create_group(&mut self, name: &str) -> Result<Group>;

    /// Create a group and move an existing task into it.
    fn create_group_from_task(&mut self, name: &str, task_id: TaskId) -> Result<GroupView>;

    /// Get a group with its tasks.
    fn get_group(&self, id: GroupId) -> Result<GroupView>;

    /// All groups.
    fn list_groups(&self) -> Result<Vec<Group>>;

    fn rename_group(&mut self, id: GroupId, name: &str) -> Result<Group>;

    /// Delete a group, keeping its tasks.
    fn delete_group(&mut self, id: GroupId) -> Result<Group>;

    /// Move a task into a group, replacing any previous group.
    fn assign_task(&mut self, group_id: GroupId, task_id: TaskId) -> Result<GroupView>;
}

impl<B: GraphStore> StoreGroupExt for Store<B> {
    fn create_group(&mut self, name: &str) -> Result<Group> {
        let group = Group {
            id: 0,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        group.validate().map_err(|e| eyre!(GraphError::from(e)))?;
        let group = self.backend_mut().transaction(|store| store.insert_group(&group))?;

        log::info!("Created group {} '{}'", group.id, group.name);
        Ok(group)
    }

    fn create_group_from_task(&mut self, name: &str, task_id: TaskId) -> Result<GroupView> {
        validate_name(name).map_err(|e| eyre!(GraphError::from(e)))?;

        let view = self.backend_mut().transaction(|store| {
            require_task(store, task_id)?;
            let group = store.insert_group(&Group {
                id: 0,
                name: name.to_string(),
                created_at: Utc::now(),
            })?;
            let task = move_task(store, task_id, Some(group.id))?;
            Ok(GroupView {
                group,
                tasks: vec![task],
            })
        })?;

        log::info!("Created group {} from task {}", view.group.id, task_id);
        Ok(view)
    }

    fn get_group(&self, id: GroupId) -> Result<GroupView> {
        let group = require_group(self.backend(), id)?;
        Ok(GroupView {
            tasks: self.backend().group_tasks(id)?,
            group,
        })
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        self.backend().list_groups()
    }

    fn rename_group(&mut self, id: GroupId, name: &str) -> Result<Group> {
        validate_name(name).map_err(|e| eyre!(GraphError::from(e)))?;

        self.backend_mut().transaction(|store| {
            let renamed = Group {
                name: name.to_string(),
                ..require_group(store, id)?
            };
            store.save_group(&renamed)?;
            Ok(renamed)
        })
    }

    fn delete_group(&mut self, id: GroupId) -> Result<Group> {
        let (group, detached) = self.backend_mut().transaction(|store| {
            let group = require_group(store, id)?;

            let now = Utc::now();
            let detached: Vec<Task> = store
                .group_tasks(id)?
                .into_iter()
                .map(|task| Task {
                    group_id: None,
                    updated_at: now,
                    ..task
                })
                .collect();
            store.save_tasks(&detached)?;
            store.delete_group(id)?;

            Ok((group, detached.len()))
        })?;

        log::info!("Deleted group {} and detached {} task(s)", id, detached);
        Ok(group)
    }

    fn assign_task(&mut self, group_id: GroupId, task_id: TaskId) -> Result<GroupView> {
        self.backend_mut().transaction(|store| {
            let group = require_group(store, group_id)?;
            move_task(store, task_id, Some(group_id))?;
            Ok(GroupView {
                tasks: store.group_tasks(group_id)?,
                group,
            })
        })
    }
}
