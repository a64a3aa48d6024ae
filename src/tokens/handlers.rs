use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        CreateApiTokenRequest, CreatedApiToken, RefreshRequest, RefreshResponse,
        ValidateApiTokenRequest, ValidateApiTokenResponse,
    },
    repo,
    repo_types::ApiToken,
    services::{self, ApiTokenCheck},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    rate_limit::{client_ip, user_agent},
    security,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/tokens", post(create_token).get(list_tokens))
        .route("/tokens/:id", delete(revoke_token))
        .route("/tokens/validate", post(validate_token))
}

#[instrument(skip(state, headers, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    if payload.refresh_token.trim().is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }
    let ip = client_ip(&headers);
    let ua = user_agent(&headers);
    let refreshed =
        services::refresh(&state, payload.refresh_token.trim(), ip.as_deref(), ua.as_deref())
            .await
            .map_err(|e| {
                warn!(error = %e, "refresh rejected");
                e
            })?;
    Ok(Json(RefreshResponse {
        session_id: refreshed.session_id,
        tokens: refreshed.tokens,
    }))
}

#[instrument(skip(state, auth, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateApiTokenRequest>,
) -> ApiResult<(StatusCode, Json<CreatedApiToken>)> {
    let (token, row) = services::create_api_token(
        &state,
        auth.user_id,
        payload.scope.as_deref(),
        payload.expires_in_days,
    )
    .await?;
    info!(user_id = %auth.user_id, token_id = %row.id, "api token created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedApiToken {
            id: row.id,
            token,
            scope: row.scope,
            expires_at: row.expires_at,
        }),
    ))
}

#[instrument(skip(state, auth))]
pub async fn list_tokens(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ApiToken>>> {
    Ok(Json(repo::list_live_api(&state.db, auth.user_id).await?))
}

#[instrument(skip(state, auth))]
pub async fn revoke_token(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !repo::revoke_api(&state.db, id, auth.user_id).await? {
        warn!(user_id = %auth.user_id, token_id = %id, "api token not found");
        return Err(ApiError::not_found("Token not found"));
    }
    security::record(
        &state.db,
        Some(auth.user_id),
        "api_token_revoked",
        serde_json::json!({ "token_id": id }),
        None,
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn validate_token(
    State(state): State<AppState>,
    Json(payload): Json<ValidateApiTokenRequest>,
) -> ApiResult<Json<ValidateApiTokenResponse>> {
    if payload.token.trim().is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    let response = match services::validate_api_token(&state, payload.token.trim()).await? {
        ApiTokenCheck::Valid(t) => ValidateApiTokenResponse {
            valid: true,
            user_id: Some(t.user_id),
            scope: Some(t.scope),
            ..Default::default()
        },
        ApiTokenCheck::Invalid(reason) => ValidateApiTokenResponse {
            reason: Some(reason),
            ..Default::default()
        },
    };
    Ok(Json(response))
}
