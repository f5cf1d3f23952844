//! Task repository: the SQLite-backed [`TaskStore`].

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::task::{ErrorCode, NewTask, Phase, Status, Task, TaskStore};

const SELECT_TASK: &str = "SELECT id, uuid, file_id, file_url, finetune_args, callback_url,
    status, result, errors, tarball_location, tarball_checksum,
    started_at, finished_at, created_at, updated_at FROM tasks";

fn task_from_row(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    Ok(Task {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        file_id: row.get("file_id")?,
        file_url: row.get("file_url")?,
        finetune_args: row.get("finetune_args")?,
        callback_url: row.get("callback_url")?,
        status: row.get("status")?,
        result: row.get("result")?,
        errors: row.get("errors")?,
        tarball_location: row.get("tarball_location")?,
        tarball_checksum: row.get("tarball_checksum")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl TaskStore for Database {
    fn insert(&self, task: NewTask) -> Result<Task, DatabaseError> {
        self.with_tx(|conn| {
            conn.execute(
                "INSERT INTO tasks (uuid, file_id, file_url, finetune_args, callback_url,
                 status, result, errors, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    task.uuid,
                    task.file_id,
                    task.file_url,
                    task.finetune_args,
                    task.callback_url,
                    Status::Created,
                    Phase::None,
                    ErrorCode::None,
                    task.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .map(|id| task.into_task(id))
    }

    fn load(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    &format!("{SELECT_TASK} WHERE id = ?1"),
                    params![id],
                    task_from_row,
                )
                .optional()?;
            Ok(task)
        })
    }

    fn find_by_uuid(&self, uuid: &str) -> Result<Option<Task>, DatabaseError> {
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    &format!("{SELECT_TASK} WHERE uuid = ?1"),
                    params![uuid],
                    task_from_row,
                )
                .optional()?;
            Ok(task)
        })
    }

    /// Commits every mutable field of `task` in one statement.
    ///
    /// The `WHERE` clause refuses rows that are already terminal, so a stale
    /// writer can never reopen a finished task.
    fn save(&self, task: &Task) -> Result<(), DatabaseError> {
        self.with_tx(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET status=?2, result=?3, errors=?4, tarball_location=?5,
                 tarball_checksum=?6, started_at=?7, finished_at=?8, updated_at=?9
                 WHERE id=?1 AND status NOT IN ('COMPLETED', 'TERMINATED')",
                params![
                    task.id,
                    task.status,
                    task.result,
                    task.errors,
                    task.tarball_location,
                    task.tarball_checksum,
                    task.started_at,
                    task.finished_at,
                    task.updated_at,
                ],
            )?;
            if changed == 1 {
                return Ok(());
            }

            let exists = conn
                .query_row("SELECT 1 FROM tasks WHERE id = ?1", params![task.id], |_| {
                    Ok(())
                })
                .optional()?
                .is_some();
            if exists {
                Err(DatabaseError::TerminalRecord { id: task.id })
            } else {
                Err(DatabaseError::NotFound { id: task.id })
            }
        })
    }

    fn list_ids(&self, status: Status, limit: usize) -> Result<Vec<i64>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM tasks WHERE status = ?1 ORDER BY id ASC LIMIT ?2")?;
            let ids = stmt
                .query_map(params![status, limit as i64], |r| r.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }
}
