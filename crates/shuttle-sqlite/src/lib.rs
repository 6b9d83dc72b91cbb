//! SQLite-backed durable task store.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{self, SqlitePool};
use tracing::warn;

use shuttle_core::StoreError;
use shuttle_core::domain::{ConversationMemory, Task, TaskId, TaskStatus};
use shuttle_core::ports::TaskStore;

mod memory;
mod schema;
mod task;

fn inspect(err: &sqlx::Error) {
    warn!("DB: {:#?}", err);
}

/// Connection-level trouble means "unavailable"; anything else is a backend error.
pub(crate) fn map_err(err: sqlx::Error) -> StoreError {
    inspect(&err);
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {millis}")))
}

#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    db: SqlitePool,
}

impl SqliteTaskStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let opts = sqlite::SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(sqlite::SqliteJournalMode::Wal);
        let db = sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(map_err)?;

        Self::with_pool(db).await
    }

    /// Private in-memory database. One connection that never recycles, since
    /// each SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let opts = sqlite::SqliteConnectOptions::from_str("sqlite::memory:").map_err(map_err)?;
        let db = sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(map_err)?;

        Self::with_pool(db).await
    }

    async fn with_pool(db: SqlitePool) -> Result<Self, StoreError> {
        schema::init_db(&db).await.map_err(map_err)?;
        Ok(Self { db })
    }

    pub async fn conversation_memory(
        &self,
        session_id: &str,
    ) -> Result<Option<ConversationMemory>, StoreError> {
        memory::read(&self.db, session_id).await
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        task::create(&self.db, task).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        task::read(&self.db, id).await
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        task::transition(&self.db, id, status, at, None, None).await
    }

    async fn complete_task(
        &self,
        id: &TaskId,
        output: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        task::transition(&self.db, id, TaskStatus::Completed, at, Some(output), None).await
    }

    async fn fail_task(
        &self,
        id: &TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        task::transition(&self.db, id, TaskStatus::Failed, at, None, Some(error)).await
    }

    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        task::list_pending(&self.db, limit).await
    }

    async fn get_stale_running_tasks(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        task::list_stale_running(&self.db, updated_before, limit).await
    }

    async fn save_conversation_memory(&self, memory: &ConversationMemory) -> Result<(), StoreError> {
        memory::upsert(&self.db, memory).await
    }

    async fn prune_terminal_tasks(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        task::prune_terminal(&self.db, before).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.db)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
