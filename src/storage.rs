//! SQLite storage for taskdeps.

use crate::graph_store::GraphStore;
use crate::types::{Dependency, Filter, Group, GroupId, Task, TaskId, TaskState};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;

/// Storage directory name.
pub const STORE_DIR: &str = ".taskdeps";

/// SQLite database file.
const DB_FILE: &str = "taskdeps.db";

/// How long a writer waits for another process's transaction.
const BUSY_TIMEOUT_MS: u64 = 5_000;

const TASK_COLUMNS: &str = "t.id, t.name, t.state, t.group_id, t.created_at, t.updated_at";

/// Storage handle backed by a single SQLite database.
pub struct Storage {
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        fs::create_dir_all(&store_dir).context("Failed to create .taskdeps directory")?;

        Self::connect(root)
    }

    /// Open existing storage.
    pub fn open(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        if !store_dir.exists() {
            eyre::bail!("No .taskdeps directory found. Run 'td init' first.");
        }

        Self::connect(root)
    }

    fn connect(root: &Path) -> Result<Self> {
        let db_path = root.join(STORE_DIR).join(DB_FILE);
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;
        db.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
            .context("Failed to set busy timeout")?;

        let storage = Self {
            db,
        };
        storage.init_schema()?;

        log::debug!("Opened database at {}", db_path.display());
        Ok(storage)
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS groups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    state TEXT NOT NULL DEFAULT 'incomplete'
                        CHECK (state IN ('incomplete', 'locked', 'complete')),
                    group_id INTEGER REFERENCES groups(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_tasks_group ON tasks(group_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state);

                CREATE TABLE IF NOT EXISTS dependencies (
                    from_id INTEGER NOT NULL REFERENCES tasks(id),
                    to_id INTEGER NOT NULL REFERENCES tasks(id),
                    PRIMARY KEY (from_id, to_id),
                    CHECK (from_id <> to_id)
                );
                CREATE INDEX IF NOT EXISTS idx_dependencies_to ON dependencies(to_id);
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Best-effort ROLLBACK of the open transaction.
    fn rollback(&self) {
        if let Err(e) = self.db.execute_batch("ROLLBACK") {
            log::warn!("Failed to roll back transaction: {}", e);
        }
    }

    /// Count all tasks.
    pub fn count_tasks(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count all dependency edges.
    pub fn count_edges(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn query_tasks(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
        let mut stmt = self.db.prepare_cached(sql)?;
        let tasks = stmt
            .query_map(params, Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Convert a database row to a Task.
    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let state_str: String = row.get(2)?;
        let state = state_str.parse::<TaskState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?;

        let created_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;

        Ok(Task {
            id: row.get(0)?,
            name: row.get(1)?,
            state,
            group_id: row.get(3)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    /// Convert a database row to a Group.
    fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<Group> {
        let created_at_str: String = row.get(2)?;
        Ok(Group {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

impl GraphStore for Storage {
    fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?");
        let task = self
            .db
            .prepare_cached(&sql)?
            .query_row(params![id], Self::row_to_task)
            .optional()?;
        Ok(task)
    }

    fn dependents(&self, id: TaskId) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM dependencies d JOIN tasks t ON t.id = d.from_id
             WHERE d.to_id = ? ORDER BY t.id"
        );
        self.query_tasks(&sql, params![id])
    }

    fn dependencies(&self, id: TaskId) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM dependencies d JOIN tasks t ON t.id = d.to_id
             WHERE d.from_id = ? ORDER BY t.id"
        );
        self.query_tasks(&sql, params![id])
    }

    fn dependency_ids(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let mut stmt = self
            .db
            .prepare_cached("SELECT to_id FROM dependencies WHERE from_id = ? ORDER BY to_id")?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<TaskId>>>()?;
        Ok(ids)
    }

    fn insert_task(&mut self, task: &Task) -> Result<Task> {
        self.db
            .execute(
                r#"
                INSERT INTO tasks (name, state, group_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
                params![
                    task.name,
                    task.state.as_str(),
                    task.group_id,
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to insert task")?;

        Ok(Task {
            id: self.db.last_insert_rowid(),
            ..task.clone()
        })
    }

    fn save_tasks(&mut self, batch: &[Task]) -> Result<()> {
        let mut stmt = self.db.prepare_cached(
            "UPDATE tasks SET name = ?, state = ?, group_id = ?, updated_at = ? WHERE id = ?",
        )?;

        for task in batch {
            let updated = stmt
                .execute(params![
                    task.name,
                    task.state.as_str(),
                    task.group_id,
                    task.updated_at.to_rfc3339(),
                    task.id,
                ])
                .with_context(|| format!("Failed to save task {}", task.id))?;
            if updated == 0 {
                eyre::bail!("Cannot save unknown task {}", task.id);
            }
        }

        Ok(())
    }

    fn delete_task(&mut self, id: TaskId) -> Result<()> {
        self.db
            .execute("DELETE FROM tasks WHERE id = ?", params![id])
            .context("Failed to delete task")?;
        Ok(())
    }

    fn insert_edge(&mut self, edge: &Dependency) -> Result<()> {
        self.db
            .execute(
                "INSERT INTO dependencies (from_id, to_id) VALUES (?, ?)",
                params![edge.from_id, edge.to_id],
            )
            .context("Failed to insert dependency")?;
        Ok(())
    }

    fn delete_edges_incident(&mut self, id: TaskId) -> Result<usize> {
        let removed = self
            .db
            .execute(
                "DELETE FROM dependencies WHERE from_id = ?1 OR to_id = ?1",
                params![id],
            )
            .context("Failed to delete dependencies")?;
        Ok(removed)
    }

    fn find_edge(&self, from_id: TaskId, to_id: TaskId) -> Result<Option<Dependency>> {
        let edge = self
            .db
            .prepare_cached("SELECT from_id, to_id FROM dependencies WHERE from_id = ? AND to_id = ?")?
            .query_row(params![from_id, to_id], |row| {
                Ok(Dependency::new(row.get(0)?, row.get(1)?))
            })
            .optional()?;
        Ok(edge)
    }

    fn list_tasks(&self, filter: &Filter) -> Result<Vec<Task>> {
        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks t
            WHERE (?1 IS NULL OR t.state = ?1)
            AND (?2 IS NULL OR t.group_id = ?2)
            AND (?3 IS NULL OR instr(t.name, ?3) > 0)
            ORDER BY t.id
            "#
        );
        self.query_tasks(
            &sql,
            params![
                filter.state.map(|s| s.as_str()),
                filter.group_id,
                filter.name_contains.as_deref(),
            ],
        )
    }

    fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        let group = self
            .db
            .prepare_cached("SELECT id, name, created_at FROM groups WHERE id = ?")?
            .query_row(params![id], Self::row_to_group)
            .optional()?;
        Ok(group)
    }

    fn insert_group(&mut self, group: &Group) -> Result<Group> {
        self.db
            .execute(
                "INSERT INTO groups (name, created_at) VALUES (?, ?)",
                params![group.name, group.created_at.to_rfc3339()],
            )
            .context("Failed to insert group")?;

        Ok(Group {
            id: self.db.last_insert_rowid(),
            ..group.clone()
        })
    }

    fn save_group(&mut self, group: &Group) -> Result<()> {
        let updated = self
            .db
            .execute(
                "UPDATE groups SET name = ? WHERE id = ?",
                params![group.name, group.id],
            )
            .context("Failed to save group")?;
        if updated == 0 {
            eyre::bail!("Cannot save unknown group {}", group.id);
        }
        Ok(())
    }

    fn delete_group(&mut self, id: GroupId) -> Result<()> {
        self.db
            .execute("DELETE FROM groups WHERE id = ?", params![id])
            .context("Failed to delete group")?;
        Ok(())
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        let mut stmt = self
            .db
            .prepare_cached("SELECT id, name, created_at FROM groups ORDER BY id")?;
        let groups = stmt
            .query_map([], Self::row_to_group)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        // Take the write lock before the closure reads anything.
        self.db
            .execute_batch("BEGIN IMMEDIATE")
            .context("Failed to begin transaction")?;

        match f(self) {
            Ok(value) => match self.db.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.rollback();
                    Err(e).context("Failed to commit transaction")
                }
            },
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }
}

/// Parse an RFC 3339 timestamp written by this module.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
