//! Database schema initialization.

use sqlx::SqlitePool;

/// Create tables and indexes if they do not exist yet.
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    // Tasks
    //*******
    // Timestamps are unix milliseconds (UTC).
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tasks (
            task_id text NOT NULL,
            user_id text NOT NULL,
            session_id text NOT NULL,
            task_type text NOT NULL,
            input text NOT NULL,
            context json NOT NULL DEFAULT '{}',
            tools json NOT NULL DEFAULT '[]',
            priority integer NOT NULL DEFAULT 0,
            status text NOT NULL,
            output text,
            error text,
            created_at integer NOT NULL,
            updated_at integer NOT NULL,
            completed_at integer,
            PRIMARY KEY(task_id)
        )",
    )
    .execute(&mut *tx)
    .await?;

    // fallback poll: pending, priority DESC, created_at ASC
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_pending
            ON tasks(status, priority DESC, created_at)",
    )
    .execute(&mut *tx)
    .await?;

    // stale running scan
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status_updated ON tasks(status, updated_at)")
        .execute(&mut *tx)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_completed_at ON tasks(completed_at)")
        .execute(&mut *tx)
        .await?;

    // Conversation memory
    //*********************
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS conversation_memory (
            session_id text NOT NULL,
            user_id text NOT NULL,
            messages json NOT NULL DEFAULT '[]',
            summary text,
            updated_at integer NOT NULL,
            PRIMARY KEY(session_id)
        )",
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
