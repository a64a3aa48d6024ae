use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::services::TokenPair;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub session_id: Uuid,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiTokenRequest {
    pub scope: Option<String>,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedApiToken {
    pub id: Uuid,
    pub token: String,
    pub scope: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct ValidateApiTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Default)]
pub struct ValidateApiTokenResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}
