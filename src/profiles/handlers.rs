use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{ArtistProfileInput, FanProfileInput, LicensorProfileInput, ServiceProviderProfileInput},
    repo::{self, ProfileInput},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    rbac,
    state::AppState,
    users::{ProfileType, User},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/profiles/:kind",
            get(get_own_profile)
                .post(create_profile)
                .put(update_profile)
                .delete(delete_profile),
        )
        .route("/profiles/:kind/:user_id", get(get_public_profile))
}

/// Runs `$f::<Input>(args)` for the input type matching the profile kind.
macro_rules! per_kind {
    ($kind:expr, $f:ident ( $($arg:expr),* )) => {
        match $kind {
            ProfileType::Artist => $f::<ArtistProfileInput>($($arg),*).await,
            ProfileType::Fan => $f::<FanProfileInput>($($arg),*).await,
            ProfileType::Licensor => $f::<LicensorProfileInput>($($arg),*).await,
            ProfileType::ServiceProvider => $f::<ServiceProviderProfileInput>($($arg),*).await,
        }
    };
}

fn parse_kind(kind: &str) -> ApiResult<ProfileType> {
    ProfileType::parse(kind).ok_or_else(|| ApiError::bad_request(format!("Unknown profile type: {kind}")))
}

/// A user's extended profile lives in the side table of their own type.
fn ensure_own_kind(profile_type: &str, kind: ProfileType) -> ApiResult<()> {
    if profile_type == kind.as_str() {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "User must have {} profile type",
            kind.as_str()
        )))
    }
}

fn parse_input<P: ProfileInput>(body: Value) -> ApiResult<P> {
    let input: P = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid profile body: {e}")))?;
    match input.required_value() {
        Some(v) if !v.trim().is_empty() => Ok(input),
        _ => Err(ApiError::bad_request(format!("{} is required", P::REQUIRED))),
    }
}

fn to_json<T: serde::Serialize>(record: T) -> ApiResult<Value> {
    Ok(serde_json::to_value(record).map_err(anyhow::Error::from)?)
}

async fn create_for<P: ProfileInput>(state: &AppState, user_id: Uuid, body: Value) -> ApiResult<Value> {
    let input = parse_input::<P>(body)?;
    let record = repo::create(&state.db, user_id, input)
        .await?
        .ok_or_else(|| ApiError::conflict("Profile already exists"))?;
    to_json(record)
}

async fn find_for<P: ProfileInput>(state: &AppState, user_id: Uuid) -> ApiResult<Value> {
    let record = repo::find::<P>(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    to_json(record)
}

async fn update_for<P: ProfileInput>(state: &AppState, user_id: Uuid, body: Value) -> ApiResult<Value> {
    let input = parse_input::<P>(body)?;
    let record = repo::update(&state.db, user_id, input)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    to_json(record)
}

async fn delete_for<P: ProfileInput>(state: &AppState, user_id: Uuid) -> ApiResult<()> {
    if repo::delete::<P>(&state.db, user_id).await? {
        Ok(())
    } else {
        Err(ApiError::not_found("Profile not found"))
    }
}

#[instrument(skip(state, auth, body))]
pub async fn create_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let kind = parse_kind(&kind)?;
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    ensure_own_kind(&user.profile_type, kind)?;
    rbac::require(&state.db, auth.user_id, "create_profile", Some(auth.user_id)).await?;
    let profile = per_kind!(kind, create_for(&state, auth.user_id, body))?;
    info!(user_id = %auth.user_id, kind = kind.as_str(), "profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

#[instrument(skip(state, auth))]
pub async fn get_own_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(kind): Path<String>,
) -> ApiResult<Json<Value>> {
    let kind = parse_kind(&kind)?;
    Ok(Json(per_kind!(kind, find_for(&state, auth.user_id))?))
}

#[instrument(skip(state, auth, body))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let kind = parse_kind(&kind)?;
    rbac::require(&state.db, auth.user_id, "update_profile", Some(auth.user_id)).await?;
    let profile = per_kind!(kind, update_for(&state, auth.user_id, body))?;
    info!(user_id = %auth.user_id, kind = kind.as_str(), "profile updated");
    Ok(Json(profile))
}

#[instrument(skip(state, auth))]
pub async fn delete_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(kind): Path<String>,
) -> ApiResult<StatusCode> {
    let kind = parse_kind(&kind)?;
    rbac::require(&state.db, auth.user_id, "delete_profile", Some(auth.user_id)).await?;
    per_kind!(kind, delete_for(&state, auth.user_id))?;
    info!(user_id = %auth.user_id, kind = kind.as_str(), "profile deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, auth))]
pub async fn get_public_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((kind, user_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let kind = parse_kind(&kind)?;
    rbac::require(&state.db, auth.user_id, "read_profile", Some(user_id)).await?;
    Ok(Json(per_kind!(kind, find_for(&state, user_id))?))
}
