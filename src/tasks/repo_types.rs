use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub category: String,
    pub status: String,
    pub due_date: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub assigned_to: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub tags: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
