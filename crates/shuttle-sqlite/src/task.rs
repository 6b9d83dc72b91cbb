//! Task persistence.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use shuttle_core::StoreError;
use shuttle_core::domain::{ParseStatusError, Task, TaskId, TaskStatus, TaskType};

use crate::{from_millis, map_err};

const COLUMNS: &str = "task_id, user_id, session_id, task_type, input, context, tools, priority,
    status, output, error, created_at, updated_at, completed_at";

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    let status: String = row.try_get("status").map_err(map_err)?;
    let context: String = row.try_get("context").map_err(map_err)?;
    let tools: String = row.try_get("tools").map_err(map_err)?;

    Ok(Task {
        id: TaskId::new(row.try_get::<String, _>("task_id").map_err(map_err)?),
        user_id: row.try_get("user_id").map_err(map_err)?,
        session_id: row.try_get("session_id").map_err(map_err)?,
        task_type: TaskType::new(row.try_get::<String, _>("task_type").map_err(map_err)?),
        input: row.try_get("input").map_err(map_err)?,
        context: serde_json::from_str(&context)?,
        tools: serde_json::from_str(&tools)?,
        priority: row.try_get("priority").map_err(map_err)?,
        status: status
            .parse()
            .map_err(|err: ParseStatusError| StoreError::Backend(err.to_string()))?,
        output: row.try_get("output").map_err(map_err)?,
        error: row.try_get("error").map_err(map_err)?,
        created_at: from_millis(row.try_get("created_at").map_err(map_err)?)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(map_err)?)?,
        completed_at: row
            .try_get::<Option<i64>, _>("completed_at")
            .map_err(map_err)?
            .map(from_millis)
            .transpose()?,
    })
}

pub(crate) async fn create(db: &SqlitePool, task: &Task) -> Result<(), StoreError> {
    let res = sqlx::query(
        "INSERT INTO tasks (task_id, user_id, session_id, task_type, input, context, tools,
            priority, status, output, error, created_at, updated_at, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task.id.as_str())
    .bind(&task.user_id)
    .bind(&task.session_id)
    .bind(task.task_type.as_str())
    .bind(&task.input)
    .bind(serde_json::to_string(&task.context)?)
    .bind(serde_json::to_string(&task.tools)?)
    .bind(task.priority)
    .bind(task.status.as_str())
    .bind(task.output.as_deref())
    .bind(task.error.as_deref())
    .bind(task.created_at.timestamp_millis())
    .bind(task.updated_at.timestamp_millis())
    .bind(task.completed_at.map(|at| at.timestamp_millis()))
    .execute(db)
    .await;

    match res {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            Err(StoreError::Conflict(task.id.clone()))
        }
        Err(err) => Err(map_err(err)),
    }
}

pub(crate) async fn read(db: &SqlitePool, id: &TaskId) -> Result<Option<Task>, StoreError> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM tasks WHERE task_id = ?"))
        .bind(id.as_str())
        .fetch_optional(db)
        .await
        .map_err(map_err)?;

    row.as_ref().map(task_from_row).transpose()
}

/// The only status a task may be in right before `next`.
fn predecessor(next: TaskStatus) -> Option<TaskStatus> {
    match next {
        TaskStatus::Pending => None,
        TaskStatus::Running => Some(TaskStatus::Pending),
        TaskStatus::Completed | TaskStatus::Failed => Some(TaskStatus::Running),
    }
}

/// Conditional status write. Only one of any set of racing writers can match
/// the `status = <predecessor>` guard.
pub(crate) async fn transition(
    db: &SqlitePool,
    id: &TaskId,
    next: TaskStatus,
    at: DateTime<Utc>,
    output: Option<&str>,
    error: Option<&str>,
) -> Result<bool, StoreError> {
    let Some(prev) = predecessor(next) else {
        return Ok(false);
    };
    let completed_at = next.is_terminal().then(|| at.timestamp_millis());

    let res = sqlx::query(
        "UPDATE tasks SET status = ?, updated_at = ?,
            completed_at = coalesce(?, completed_at),
            output = coalesce(?, output),
            error = coalesce(?, error)
        WHERE task_id = ? AND status = ?",
    )
    .bind(next.as_str())
    .bind(at.timestamp_millis())
    .bind(completed_at)
    .bind(output)
    .bind(error)
    .bind(id.as_str())
    .bind(prev.as_str())
    .execute(db)
    .await
    .map_err(map_err)?;

    Ok(res.rows_affected() == 1)
}

pub(crate) async fn list_pending(db: &SqlitePool, limit: usize) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM tasks
        WHERE status = 'pending'
        ORDER BY priority DESC, created_at ASC, task_id ASC
        LIMIT ?"
    ))
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(db)
    .await
    .map_err(map_err)?;

    rows.iter().map(task_from_row).collect()
}

pub(crate) async fn list_stale_running(
    db: &SqlitePool,
    updated_before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM tasks
        WHERE status = 'running' AND updated_at < ?
        ORDER BY updated_at ASC, task_id ASC
        LIMIT ?"
    ))
    .bind(updated_before.timestamp_millis())
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(db)
    .await
    .map_err(map_err)?;

    rows.iter().map(task_from_row).collect()
}

pub(crate) async fn prune_terminal(db: &SqlitePool, before: DateTime<Utc>) -> Result<u64, StoreError> {
    let res = sqlx::query(
        "DELETE FROM tasks WHERE status IN ('completed', 'failed') AND completed_at < ?",
    )
    .bind(before.timestamp_millis())
    .execute(db)
    .await
    .map_err(map_err)?;

    Ok(res.rows_affected())
}
