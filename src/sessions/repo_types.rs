use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const ACTIVE: &str = "active";
pub const REVOKED: &str = "revoked";
pub const EXPIRED: &str = "expired";
pub const SUSPENDED: &str = "suspended";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub expires_at: OffsetDateTime,
    pub last_activity: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Per-status counts for one user.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SessionStats {
    pub active: i64,
    pub revoked: i64,
    pub expired: i64,
    pub suspended: i64,
}
