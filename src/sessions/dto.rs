use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{repo_types::Session, repo_types::SessionStats, services::mask_ip};

/// Session as shown to its owner.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_activity: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub is_current: bool,
}

impl SessionView {
    pub fn new(s: Session, current: Uuid) -> Self {
        Self {
            is_current: s.id == current,
            id: s.id,
            device_info: s.device_info,
            ip_address: s.ip_address.as_deref().map(mask_ip),
            user_agent: s.user_agent,
            location: s.location,
            created_at: s.created_at,
            last_activity: s.last_activity,
            expires_at: s.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: usize,
}

#[derive(Debug, Deserialize)]
pub struct ValidateSessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ValidateSessionResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<OffsetDateTime>,
}
