use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        RevokedResponse, SessionListResponse, SessionView, ValidateSessionRequest,
        ValidateSessionResponse,
    },
    repo,
    services::{self, SessionCheck},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).delete(revoke_other_sessions))
        .route("/sessions/:id", delete(revoke_session))
        .route("/sessions/validate", post(validate_session))
}

#[instrument(skip(state, auth))]
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<SessionListResponse>> {
    let sessions = repo::list_active(&state.db, auth.user_id).await?;
    let stats = repo::stats(&state.db, auth.user_id).await?;
    Ok(Json(SessionListResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionView::new(s, auth.session_id))
            .collect(),
        stats,
    }))
}

#[instrument(skip(state, auth))]
pub async fn revoke_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RevokedResponse>> {
    let session = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    if session.user_id != auth.user_id {
        warn!(user_id = %auth.user_id, session_id = %id, "revoke of foreign session");
        return Err(ApiError::forbidden("Cannot revoke another user's session"));
    }

    let revoked = services::revoke_session(&state.db, id, Some(auth.user_id), "user_request").await?;
    info!(user_id = %auth.user_id, session_id = %id, revoked, "session revoke requested");
    Ok(Json(RevokedResponse {
        revoked: usize::from(revoked),
    }))
}

#[instrument(skip(state, auth))]
pub async fn revoke_other_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<RevokedResponse>> {
    let revoked = services::revoke_all_user_sessions(
        &state.db,
        auth.user_id,
        Some(auth.session_id),
        "user_request",
    )
    .await?;
    info!(user_id = %auth.user_id, revoked, "other sessions revoked");
    Ok(Json(RevokedResponse { revoked }))
}

#[instrument(skip(state, auth, payload))]
pub async fn validate_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ValidateSessionRequest>,
) -> ApiResult<Json<ValidateSessionResponse>> {
    let response = match services::validate_session(&state.db, payload.session_id).await? {
        SessionCheck::Valid(s) if s.user_id == auth.user_id => ValidateSessionResponse {
            valid: true,
            reason: None,
            expires_at: Some(s.expires_at),
        },
        SessionCheck::Valid(_) => return Err(ApiError::forbidden("Session belongs to another user")),
        SessionCheck::Invalid(reason) => ValidateSessionResponse {
            valid: false,
            reason: Some(reason),
            expires_at: None,
        },
    };
    Ok(Json(response))
}
