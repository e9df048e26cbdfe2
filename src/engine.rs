//! Dependency graph engine.
//!
//! Everything that reads or writes a task's derived state lives here. The
//! functions run against any [`GraphStore`] and assume the caller has opened a
//! transaction around them; none of them open one.
//!
//! The invariant maintained across every operation:
//!
//! - the dependency edges form a DAG;
//! - a task that is not `Complete` is `Locked` iff at least one of its direct
//!   dependencies is not `Complete`, and `Incomplete` otherwise;
//! - every direct dependency of a `Complete` task is `Complete`.
//!
//! [`add_dependency`] is the only path that tightens state (locks a task).
//! [`unblock`] is the only path that relaxes it. [`mark_incomplete`] cascades
//! locks through the dependents that had been completed on top of a reopened
//! task.

use crate::error::GraphError;
use crate::graph_store::GraphStore;
use crate::types::{Dependency, Filter, Task, TaskId, TaskState};
use eyre::{Result, eyre};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Load a task or fail with [`GraphError::TaskNotFound`].
pub fn require_task<S: GraphStore>(store: &S, id: TaskId) -> Result<Task> {
    store
        .get_task(id)?
        .ok_or_else(|| eyre!(GraphError::TaskNotFound(id)))
}

/// All tasks reachable from `id` by following dependency edges, excluding `id`.
pub fn reachable_from<S: GraphStore>(store: &S, id: TaskId) -> Result<BTreeSet<TaskId>> {
    let mut reached = BTreeSet::new();
    let mut queue = VecDeque::from([id]);

    while let Some(current) = queue.pop_front() {
        for next in store.dependency_ids(current)? {
            if next != id && reached.insert(next) {
                queue.push_back(next);
            }
        }
    }

    Ok(reached)
}

/// Check if adding `from -> to` would close a cycle.
///
/// The edge closes a cycle iff `from` is already reachable from `to`.
pub fn would_create_cycle<S: GraphStore>(store: &S, from_id: TaskId, to_id: TaskId) -> Result<bool> {
    Ok(from_id == to_id || reachable_from(store, to_id)?.contains(&from_id))
}

/// Make `from_id` depend on `to_id`.
///
/// Returns the existing edge unchanged if it is already present. A new edge
/// onto a task that is not complete locks `from_id`.
pub fn add_dependency<S: GraphStore>(store: &mut S, from_id: TaskId, to_id: TaskId) -> Result<Dependency> {
    if from_id == to_id {
        return Err(eyre!(GraphError::SelfDependency));
    }

    let from = require_task(store, from_id)?;
    if from.state.is_complete() {
        return Err(eyre!(GraphError::CompletedTaskImmutable(from_id)));
    }
    let to = require_task(store, to_id)?;

    if let Some(existing) = store.find_edge(from_id, to_id)? {
        log::debug!("Dependency {} -> {} already exists", from_id, to_id);
        return Ok(existing);
    }

    if would_create_cycle(store, from_id, to_id)? {
        return Err(eyre!(GraphError::CycleDetected {
            from: from_id,
            to: to_id
        }));
    }

    let edge = Dependency::new(from_id, to_id);
    store.insert_edge(&edge)?;

    if !to.state.is_complete() && from.state != TaskState::Locked {
        store.save_tasks(&[from.with_state(TaskState::Locked)])?;
        log::debug!("Task {} locked by new dependency on {}", from_id, to_id);
    }

    Ok(edge)
}

/// Re-derive the state of every direct dependent of `id`, treating `id` as no
/// longer blocking.
///
/// Only one level is examined: a dependent becomes `Incomplete` when all of its
/// other direct dependencies are complete, and `Locked` otherwise. Complete
/// dependents are left alone. Returns the dependents whose state changed.
pub fn unblock<S: GraphStore>(store: &mut S, id: TaskId) -> Result<Vec<Task>> {
    let mut changed = Vec::new();

    for dependent in store.dependents(id)? {
        if dependent.state.is_complete() {
            continue;
        }

        let still_blocked = store
            .dependencies(dependent.id)?
            .iter()
            .any(|dep| dep.id != id && !dep.state.is_complete());

        let state = if still_blocked {
            TaskState::Locked
        } else {
            TaskState::Incomplete
        };

        if state != dependent.state {
            changed.push(dependent.with_state(state));
        }
    }

    if !changed.is_empty() {
        store.save_tasks(&changed)?;
        log::debug!("Unblocking {} re-derived {} dependent(s)", id, changed.len());
    }

    Ok(changed)
}

/// Mark a task complete and unblock its dependents.
///
/// Completing an already complete task is a no-op. Locked tasks are rejected.
pub fn mark_complete<S: GraphStore>(store: &mut S, id: TaskId) -> Result<Task> {
    let task = require_task(store, id)?;

    match task.state {
        TaskState::Locked => Err(eyre!(GraphError::TaskLocked(id))),
        TaskState::Complete => Ok(task),
        TaskState::Incomplete => {
            let completed = task.with_state(TaskState::Complete);
            store.save_tasks(std::slice::from_ref(&completed))?;
            unblock(store, id)?;
            Ok(completed)
        }
    }
}

/// Reopen a complete task, locking everything that had been completed on top
/// of it.
///
/// Walks the dependent subgraph with an explicit worklist. Each dependent that
/// was `Incomplete` or `Complete` becomes `Locked`; the walk continues only
/// through dependents that were `Complete`, since anything that was not
/// complete cannot have complete dependents. Tasks that are not complete are
/// returned unchanged.
pub fn mark_incomplete<S: GraphStore>(store: &mut S, id: TaskId) -> Result<Task> {
    let task = require_task(store, id)?;
    if !task.state.is_complete() {
        return Ok(task);
    }

    let mut visited = HashSet::from([id]);
    let mut worklist = vec![id];
    let mut batch = Vec::new();

    while let Some(current) = worklist.pop() {
        for dependent in store.dependents(current)? {
            if !visited.insert(dependent.id) {
                continue;
            }
            match dependent.state {
                TaskState::Complete => {
                    worklist.push(dependent.id);
                    batch.push(dependent.with_state(TaskState::Locked));
                }
                TaskState::Incomplete => batch.push(dependent.with_state(TaskState::Locked)),
                TaskState::Locked => {}
            }
        }
    }

    let locked = batch.len();
    let reopened = task.with_state(TaskState::Incomplete);
    batch.push(reopened.clone());
    store.save_tasks(&batch)?;

    log::debug!("Reopening {} locked {} dependent(s)", id, locked);
    Ok(reopened)
}

/// Delete a task and every edge touching it.
///
/// Removing a task that is not complete removes an unmet precondition from
/// its dependents, so they are unblocked first.
pub fn delete_task<S: GraphStore>(store: &mut S, id: TaskId) -> Result<Task> {
    let task = require_task(store, id)?;

    if !task.state.is_complete() {
        unblock(store, id)?;
    }

    let edges = store.delete_edges_incident(id)?;
    store.delete_task(id)?;

    log::debug!("Deleted task {} and {} edge(s)", id, edges);
    Ok(task)
}

/// Longest-path depth of every task reachable from `id`.
///
/// Direct dependencies have depth 1. A task reachable along several paths
/// gets the longest one.
pub fn dependency_depths<S: GraphStore>(store: &S, id: TaskId) -> Result<BTreeMap<TaskId, usize>> {
    let mut graph: DiGraphMap<TaskId, ()> = DiGraphMap::new();
    graph.add_node(id);

    for node in std::iter::once(id).chain(reachable_from(store, id)?) {
        for next in store.dependency_ids(node)? {
            graph.add_edge(node, next, ());
        }
    }

    let order = toposort(&graph, None)
        .map_err(|cycle| eyre!("Dependency graph contains a cycle through task {}", cycle.node_id()))?;

    let mut depths = BTreeMap::from([(id, 0usize)]);
    for node in order {
        let Some(&depth) = depths.get(&node) else {
            continue;
        };
        for next in graph.neighbors(node) {
            let slot = depths.entry(next).or_insert(0);
            *slot = (*slot).max(depth + 1);
        }
    }

    depths.remove(&id);
    Ok(depths)
}

/// The transitive dependencies of `id`, in an order they can be completed.
///
/// Sorted by descending depth so a task always appears before anything that
/// depends on it; equal depths are ordered by ID.
pub fn topological_order<S: GraphStore>(store: &S, id: TaskId) -> Result<Vec<Task>> {
    require_task(store, id)?;

    let mut ranked: Vec<(usize, TaskId)> = dependency_depths(store, id)?
        .into_iter()
        .map(|(task_id, depth)| (depth, task_id))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    ranked.into_iter().map(|(_, task_id)| require_task(store, task_id)).collect()
}

/// IDs of tasks whose stored state disagrees with their dependencies.
pub fn inconsistent_tasks<S: GraphStore>(store: &S) -> Result<Vec<TaskId>> {
    let mut inconsistent = Vec::new();

    for task in store.list_tasks(&Filter::new())? {
        let blocked = store.dependencies(task.id)?.iter().any(|dep| !dep.state.is_complete());
        let consistent = match task.state {
            TaskState::Complete => !blocked,
            TaskState::Locked => blocked,
            TaskState::Incomplete => !blocked,
        };
        if !consistent {
            inconsistent.push(task.id);
        }
    }

    Ok(inconsistent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use chrono::Utc;

    fn task(storage: &mut MemoryStorage, name: &str) -> TaskId {
        let now = Utc::now();
        storage
            .insert_task(&Task {
                id: 0,
                name: name.to_string(),
                state: TaskState::Incomplete,
                group_id: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
            .id
    }

    fn state(storage: &MemoryStorage, id: TaskId) -> TaskState {
        storage.get_task(id).unwrap().unwrap().state
    }

    fn graph_error(result: Result<impl std::fmt::Debug>) -> GraphError {
        result.unwrap_err().downcast_ref::<GraphError>().cloned().unwrap()
    }

    /// a -> b -> c
    fn chain(storage: &mut MemoryStorage) -> (TaskId, TaskId, TaskId) {
        let a = task(storage, "A");
        let b = task(storage, "B");
        let c = task(storage, "C");
        add_dependency(storage, a, b).unwrap();
        add_dependency(storage, b, c).unwrap();
        (a, b, c)
    }

    /// a -> {b, c} -> d
    fn diamond(storage: &mut MemoryStorage) -> (TaskId, TaskId, TaskId, TaskId) {
        let a = task(storage, "A");
        let b = task(storage, "B");
        let c = task(storage, "C");
        let d = task(storage, "D");
        add_dependency(storage, a, b).unwrap();
        add_dependency(storage, a, c).unwrap();
        add_dependency(storage, b, d).unwrap();
        add_dependency(storage, c, d).unwrap();
        (a, b, c, d)
    }

    #[test]
    fn test_add_dependency_locks_dependent() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");
        let b = task(&mut storage, "B");

        let edge = add_dependency(&mut storage, a, b).unwrap();

        assert_eq!(edge, Dependency::new(a, b));
        assert_eq!(state(&storage, a), TaskState::Locked);
        assert_eq!(state(&storage, b), TaskState::Incomplete);
    }

    #[test]
    fn test_add_dependency_on_complete_task_does_not_lock() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");
        let b = task(&mut storage, "B");
        mark_complete(&mut storage, b).unwrap();

        add_dependency(&mut storage, a, b).unwrap();
        assert_eq!(state(&storage, a), TaskState::Incomplete);
    }

    #[test]
    fn test_add_dependency_is_idempotent() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");
        let b = task(&mut storage, "B");

        let first = add_dependency(&mut storage, a, b).unwrap();
        let second = add_dependency(&mut storage, a, b).unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.edge_count(), 1);
        assert_eq!(state(&storage, a), TaskState::Locked);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");

        assert_eq!(graph_error(add_dependency(&mut storage, a, a)), GraphError::SelfDependency);
    }

    #[test]
    fn test_self_dependency_checked_before_existence() {
        let mut storage = MemoryStorage::new();
        assert_eq!(graph_error(add_dependency(&mut storage, 42, 42)), GraphError::SelfDependency);
    }

    #[test]
    fn test_completed_task_cannot_gain_dependencies() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");
        let b = task(&mut storage, "B");
        mark_complete(&mut storage, a).unwrap();

        assert_eq!(
            graph_error(add_dependency(&mut storage, a, b)),
            GraphError::CompletedTaskImmutable(a)
        );
        assert_eq!(storage.edge_count(), 0);
    }

    #[test]
    fn test_missing_tasks_rejected() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");

        assert_eq!(graph_error(add_dependency(&mut storage, 99, a)), GraphError::TaskNotFound(99));
        assert_eq!(graph_error(add_dependency(&mut storage, a, 99)), GraphError::TaskNotFound(99));
    }

    #[test]
    fn test_cycle_rejected_without_writes() {
        let mut storage = MemoryStorage::new();
        let (a, _b, c) = chain(&mut storage);

        assert_eq!(
            graph_error(add_dependency(&mut storage, c, a)),
            GraphError::CycleDetected { from: c, to: a }
        );
        assert_eq!(storage.edge_count(), 2);
        assert_eq!(state(&storage, c), TaskState::Incomplete);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut storage = MemoryStorage::new();
        let (a, _, _, d) = diamond(&mut storage);

        assert!(!would_create_cycle(&storage, a, d).unwrap());
        assert!(would_create_cycle(&storage, d, a).unwrap());
    }

    #[test]
    fn test_reachable_from() {
        let mut storage = MemoryStorage::new();
        let (a, b, c, d) = diamond(&mut storage);

        assert_eq!(reachable_from(&storage, a).unwrap(), BTreeSet::from([b, c, d]));
        assert_eq!(reachable_from(&storage, b).unwrap(), BTreeSet::from([d]));
        assert!(reachable_from(&storage, d).unwrap().is_empty());
    }

    #[test]
    fn test_mark_complete_locked_rejected() {
        let mut storage = MemoryStorage::new();
        let (a, _, _) = chain(&mut storage);

        assert_eq!(graph_error(mark_complete(&mut storage, a)), GraphError::TaskLocked(a));
        assert_eq!(state(&storage, a), TaskState::Locked);
    }

    #[test]
    fn test_mark_complete_twice_is_noop() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");

        let first = mark_complete(&mut storage, a).unwrap();
        let second = mark_complete(&mut storage, a).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_complete_chain_bottom_up() {
        let mut storage = MemoryStorage::new();
        let (a, b, c) = chain(&mut storage);

        assert_eq!(state(&storage, b), TaskState::Locked);
        mark_complete(&mut storage, c).unwrap();
        assert_eq!(state(&storage, b), TaskState::Incomplete);
        assert_eq!(state(&storage, a), TaskState::Locked);

        mark_complete(&mut storage, b).unwrap();
        assert_eq!(state(&storage, a), TaskState::Incomplete);

        mark_complete(&mut storage, a).unwrap();
        for id in [a, b, c] {
            assert_eq!(state(&storage, id), TaskState::Complete);
        }
    }

    #[test]
    fn test_unblock_respects_other_dependencies() {
        let mut storage = MemoryStorage::new();
        let (a, b, c, d) = diamond(&mut storage);

        mark_complete(&mut storage, d).unwrap();
        mark_complete(&mut storage, b).unwrap();
        // c is still open, so a stays locked
        assert_eq!(state(&storage, a), TaskState::Locked);

        mark_complete(&mut storage, c).unwrap();
        assert_eq!(state(&storage, a), TaskState::Incomplete);
    }

    #[test]
    fn test_unblock_is_one_level() {
        let mut storage = MemoryStorage::new();
        let (a, b, c) = chain(&mut storage);

        let changed = unblock(&mut storage, c).unwrap();
        assert_eq!(changed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![b]);
        assert_eq!(state(&storage, a), TaskState::Locked);
    }

    #[test]
    fn test_reopen_cascades_through_completed_dependents() {
        let mut storage = MemoryStorage::new();
        let (a, b, c) = chain(&mut storage);
        for id in [c, b, a] {
            mark_complete(&mut storage, id).unwrap();
        }

        let reopened = mark_incomplete(&mut storage, c).unwrap();

        assert_eq!(reopened.state, TaskState::Incomplete);
        assert_eq!(state(&storage, b), TaskState::Locked);
        assert_eq!(state(&storage, a), TaskState::Locked);
    }

    #[test]
    fn test_reopen_middle_of_chain() {
        let mut storage = MemoryStorage::new();
        let (a, b, c) = chain(&mut storage);
        for id in [c, b, a] {
            mark_complete(&mut storage, id).unwrap();
        }

        mark_incomplete(&mut storage, b).unwrap();

        assert_eq!(state(&storage, a), TaskState::Locked);
        assert_eq!(state(&storage, b), TaskState::Incomplete);
        assert_eq!(state(&storage, c), TaskState::Complete);
    }

    #[test]
    fn test_reopen_stops_at_incomplete_dependents() {
        let mut storage = MemoryStorage::new();
        let (a, b, c) = chain(&mut storage);
        let top = task(&mut storage, "Top");
        add_dependency(&mut storage, top, a).unwrap();
        mark_complete(&mut storage, c).unwrap();
        mark_complete(&mut storage, b).unwrap();

        // a is Incomplete, top is Locked on a
        mark_incomplete(&mut storage, b).unwrap();

        assert_eq!(state(&storage, a), TaskState::Locked);
        assert_eq!(state(&storage, top), TaskState::Locked);
        assert!(inconsistent_tasks(&storage).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_diamond_visits_shared_dependent_once() {
        let mut storage = MemoryStorage::new();
        let (a, b, c, d) = diamond(&mut storage);
        for id in [d, b, c, a] {
            mark_complete(&mut storage, id).unwrap();
        }

        mark_incomplete(&mut storage, d).unwrap();

        assert_eq!(state(&storage, d), TaskState::Incomplete);
        for id in [a, b, c] {
            assert_eq!(state(&storage, id), TaskState::Locked);
        }
        assert!(inconsistent_tasks(&storage).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_incomplete_task_is_noop() {
        let mut storage = MemoryStorage::new();
        let (a, b, _) = chain(&mut storage);

        let before = storage.get_task(b).unwrap().unwrap();
        let after = mark_incomplete(&mut storage, b).unwrap();

        assert_eq!(before, after);
        assert_eq!(state(&storage, a), TaskState::Locked);
    }

    #[test]
    fn test_delete_unblocks_dependents() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");
        let b = task(&mut storage, "B");
        add_dependency(&mut storage, a, b).unwrap();

        let deleted = delete_task(&mut storage, b).unwrap();

        assert_eq!(deleted.id, b);
        assert!(storage.get_task(b).unwrap().is_none());
        assert_eq!(storage.edge_count(), 0);
        assert_eq!(state(&storage, a), TaskState::Incomplete);
    }

    #[test]
    fn test_delete_removes_edges_in_both_directions() {
        let mut storage = MemoryStorage::new();
        let (a, b, c) = chain(&mut storage);

        delete_task(&mut storage, b).unwrap();

        assert_eq!(storage.edge_count(), 0);
        assert_eq!(state(&storage, a), TaskState::Incomplete);
        assert_eq!(state(&storage, c), TaskState::Incomplete);
    }

    #[test]
    fn test_delete_keeps_other_blockers() {
        let mut storage = MemoryStorage::new();
        let (a, b, _c, _d) = diamond(&mut storage);

        delete_task(&mut storage, b).unwrap();
        // a still waits on c
        assert_eq!(state(&storage, a), TaskState::Locked);
    }

    #[test]
    fn test_delete_complete_task_leaves_dependents() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");
        let b = task(&mut storage, "B");
        add_dependency(&mut storage, a, b).unwrap();
        mark_complete(&mut storage, b).unwrap();
        mark_complete(&mut storage, a).unwrap();

        delete_task(&mut storage, b).unwrap();
        assert_eq!(state(&storage, a), TaskState::Complete);
    }

    #[test]
    fn test_delete_missing_task() {
        let mut storage = MemoryStorage::new();
        assert_eq!(graph_error(delete_task(&mut storage, 5)), GraphError::TaskNotFound(5));
    }

    #[test]
    fn test_depths_use_longest_path() {
        let mut storage = MemoryStorage::new();
        let (a, b, c, d) = diamond(&mut storage);
        // shortcut a -> d must not pull d up to depth 1
        add_dependency(&mut storage, a, d).unwrap();

        let depths = dependency_depths(&storage, a).unwrap();
        assert_eq!(depths, BTreeMap::from([(b, 1), (c, 1), (d, 2)]));
    }

    #[test]
    fn test_topological_order_diamond() {
        let mut storage = MemoryStorage::new();
        let (a, b, c, d) = diamond(&mut storage);

        let order: Vec<TaskId> = topological_order(&storage, a)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(order, vec![d, b, c]);

        let again: Vec<TaskId> = topological_order(&storage, a)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(order, again);
    }

    #[test]
    fn test_topological_order_leaf_is_empty() {
        let mut storage = MemoryStorage::new();
        let a = task(&mut storage, "A");
        assert!(topological_order(&storage, a).unwrap().is_empty());
    }

    #[test]
    fn test_topological_order_missing_task() {
        let storage = MemoryStorage::new();
        assert_eq!(graph_error(topological_order(&storage, 3)), GraphError::TaskNotFound(3));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let mut storage = MemoryStorage::new();
        let ids: Vec<TaskId> = (0..5_000).map(|i| task(&mut storage, &format!("T{}", i))).collect();
        for pair in ids.windows(2) {
            add_dependency(&mut storage, pair[0], pair[1]).unwrap();
        }
        for &id in ids.iter().rev() {
            mark_complete(&mut storage, id).unwrap();
        }

        mark_incomplete(&mut storage, ids[ids.len() - 1]).unwrap();

        assert_eq!(state(&storage, ids[0]), TaskState::Locked);
        assert_eq!(topological_order(&storage, ids[0]).unwrap().len(), ids.len() - 1);
        assert!(inconsistent_tasks(&storage).unwrap().is_empty());
    }
}
