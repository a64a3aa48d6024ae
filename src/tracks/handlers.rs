use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{TrackInput, TrackListQuery, UploadResponse},
    repo,
    repo_types::Track,
    services::{self, UploadKind},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    profiles, rbac,
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/tracks", get(list_tracks).post(create_track))
        .route("/tracks/:id", get(get_track).put(update_track).delete(delete_track))
        .route("/tracks/:id/audio", get(stream_audio))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/tracks/:id/audio", post(upload_audio))
        .route("/tracks/:id/cover", post(upload_cover))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[instrument(skip(state, auth, payload))]
pub async fn create_track(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<TrackInput>,
) -> ApiResult<(StatusCode, Json<Track>)> {
    let title = payload
        .title()
        .ok_or_else(|| ApiError::bad_request("title is required"))?;
    let artist_id = profiles::repo::artist_id_for_user(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %auth.user_id, "track create without artist profile");
            ApiError::forbidden("An artist profile is required to create tracks")
        })?;
    rbac::require(&state.db, auth.user_id, "create_track", Some(auth.user_id)).await?;

    let track = repo::insert(&state.db, artist_id, &title, payload).await?;
    info!(user_id = %auth.user_id, track_id = %track.id, "track created");
    Ok((StatusCode::CREATED, Json(track)))
}

#[instrument(skip(state, auth))]
pub async fn get_track(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Track>> {
    rbac::require(&state.db, auth.user_id, "read_tracks", None).await?;
    let track = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Track not found"))?;
    Ok(Json(track))
}

#[instrument(skip(state, auth))]
pub async fn list_tracks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<TrackListQuery>,
) -> ApiResult<Json<Vec<Track>>> {
    let artist_id = q
        .artist_id
        .ok_or_else(|| ApiError::bad_request("artist_id is required"))?;
    rbac::require(&state.db, auth.user_id, "read_tracks", None).await?;
    let tracks =
        repo::list_by_artist(&state.db, artist_id, q.limit.clamp(1, 100), q.offset.max(0)).await?;
    Ok(Json(tracks))
}

#[instrument(skip(state, auth, payload))]
pub async fn update_track(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TrackInput>,
) -> ApiResult<Json<Track>> {
    let title = payload
        .title()
        .ok_or_else(|| ApiError::bad_request("title is required"))?;
    services::load_for_write(&state, auth.user_id, id, "update_track").await?;
    let track = repo::update(&state.db, id, &title, payload)
        .await?
        .ok_or_else(|| ApiError::not_found("Track not found"))?;
    info!(user_id = %auth.user_id, track_id = %id, "track updated");
    Ok(Json(track))
}

#[instrument(skip(state, auth))]
pub async fn delete_track(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let track = services::load_for_write(&state, auth.user_id, id, "delete_track").await?;
    if !repo::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Track not found"));
    }
    services::remove_objects(&state, &track).await;
    info!(user_id = %auth.user_id, track_id = %id, "track deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Pulls the `file` part out of a multipart body.
async fn read_file_field(mp: &mut Multipart) -> ApiResult<(bytes::Bytes, String)> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Invalid file part: {e}")))?;
            if data.is_empty() {
                break;
            }
            return Ok((data, content_type));
        }
    }
    Err(ApiError::bad_request("file is required"))
}

async fn upload(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
    kind: UploadKind,
    mut mp: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let track = services::load_for_write(state, auth.user_id, id, "upload_track").await?;
    let (body, content_type) = read_file_field(&mut mp).await?;
    let size = body.len();
    let key = services::attach_upload(state, &track, kind, body, &content_type).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            track_id: id,
            key,
            content_type,
            size,
        }),
    ))
}

#[instrument(skip(state, auth, mp))]
pub async fn upload_audio(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    mp: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    upload(&state, &auth, id, UploadKind::Audio, mp).await
}

#[instrument(skip(state, auth, mp))]
pub async fn upload_cover(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    mp: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    upload(&state, &auth, id, UploadKind::Cover, mp).await
}

/// 302 to a short-lived presigned URL of the track audio.
#[instrument(skip(state, auth))]
pub async fn stream_audio(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Redirect> {
    rbac::require(&state.db, auth.user_id, "read_tracks", None).await?;
    let track = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Track not found"))?;
    let url = services::presign_audio(&state, &track).await?;
    Ok(Redirect::temporary(&url))
}
