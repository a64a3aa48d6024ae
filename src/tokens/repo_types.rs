use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub rotated_from: Option<Uuid>,
    pub is_revoked: bool,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Long-lived bearer credential for programmatic access.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApiToken {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_id: Uuid,
    pub scope: String,
    pub is_revoked: bool,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}
