use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub role: String,
    pub context: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub last_activity: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub message: String,
    pub response: String,
    pub role: String,
    pub created_at: OffsetDateTime,
}
