//! Conversation memory persistence (one row per session).

use sqlx::{Row, SqlitePool};

use shuttle_core::StoreError;
use shuttle_core::domain::ConversationMemory;

use crate::{from_millis, map_err};

pub(crate) async fn upsert(db: &SqlitePool, memory: &ConversationMemory) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO conversation_memory (session_id, user_id, messages, summary, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            user_id = excluded.user_id,
            messages = excluded.messages,
            summary = excluded.summary,
            updated_at = excluded.updated_at",
    )
    .bind(&memory.session_id)
    .bind(&memory.user_id)
    .bind(serde_json::to_string(&memory.messages)?)
    .bind(memory.summary.as_deref())
    .bind(memory.updated_at.timestamp_millis())
    .execute(db)
    .await
    .map_err(map_err)?;

    Ok(())
}

pub(crate) async fn read(
    db: &SqlitePool,
    session_id: &str,
) -> Result<Option<ConversationMemory>, StoreError> {
    let row = sqlx::query(
        "SELECT session_id, user_id, messages, summary, updated_at
        FROM conversation_memory WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_optional(db)
    .await
    .map_err(map_err)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let messages: String = row.try_get("messages").map_err(map_err)?;
    Ok(Some(ConversationMemory {
        session_id: row.try_get("session_id").map_err(map_err)?,
        user_id: row.try_get("user_id").map_err(map_err)?,
        messages: serde_json::from_str(&messages)?,
        summary: row.try_get("summary").map_err(map_err)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(map_err)?)?,
    }))
}
