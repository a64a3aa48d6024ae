use anyhow::Context;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{ChatMessage, ChatSession};

const SESSION_COLUMNS: &str = "id, user_id, role, context, created_at, last_activity";
const MESSAGE_COLUMNS: &str = "id, session_id, message, response, role, created_at";

pub async fn create_session(db: &PgPool, user_id: Uuid, role: &str) -> anyhow::Result<ChatSession> {
    let session = sqlx::query_as::<_, ChatSession>(&format!(
        "INSERT INTO chat_sessions (user_id, role) VALUES ($1, $2) RETURNING {SESSION_COLUMNS}"
    ))
    .bind(user_id)
    .bind(role)
    .fetch_one(db)
    .await
    .context("insert chat session")?;
    Ok(session)
}

/// Session owned by `user_id`; someone else's session reads as missing.
pub async fn find_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<ChatSession>> {
    let session = sqlx::query_as::<_, ChatSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(session)
}

/// Appends a message and bumps the session's `last_activity`.
pub async fn insert_message(
    db: &PgPool,
    session_id: Uuid,
    message: &str,
    response: &str,
    role: &str,
) -> anyhow::Result<ChatMessage> {
    let mut tx = db.begin().await?;
    let msg = sqlx::query_as::<_, ChatMessage>(&format!(
        r#"
        INSERT INTO chat_messages (session_id, message, response, role)
        VALUES ($1, $2, $3, $4)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(message)
    .bind(response)
    .bind(role)
    .fetch_one(&mut *tx)
    .await
    .context("insert chat message")?;

    sqlx::query("UPDATE chat_sessions SET last_activity = now() WHERE id = $1")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(msg)
}

pub async fn list_messages(db: &PgPool, session_id: Uuid, limit: i64) -> anyhow::Result<Vec<ChatMessage>> {
    let rows = sqlx::query_as::<_, ChatMessage>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
          FROM chat_messages
         WHERE session_id = $1
         ORDER BY created_at DESC
         LIMIT $2
        "#
    ))
    .bind(session_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn set_context(db: &PgPool, id: Uuid, context: Option<Value>) -> anyhow::Result<Option<ChatSession>> {
    let session = sqlx::query_as::<_, ChatSession>(&format!(
        r#"
        UPDATE chat_sessions
           SET context = $2, last_activity = now()
         WHERE id = $1
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(context)
    .fetch_optional(db)
    .await?;
    Ok(session)
}
