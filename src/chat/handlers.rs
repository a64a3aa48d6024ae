use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    dto::{role_or_default, ContextResponse, ContextUpdate, CreateChatSessionRequest, MessagesQuery, PostMessageRequest},
    repo,
    repo_types::{ChatMessage, ChatSession},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat/sessions", post(create_session))
        .route("/chat/sessions/:id", get(get_session))
        .route("/chat/sessions/:id/messages", get(list_messages).post(post_message))
        .route("/chat/sessions/:id/context", get(get_context).put(put_context))
}

async fn owned(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<ChatSession> {
    repo::find_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat session not found"))
}

#[instrument(skip(state, auth, payload))]
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Option<Json<CreateChatSessionRequest>>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    let Json(req) = payload.unwrap_or_default();
    let role = role_or_default(req.role.as_deref());
    let session = repo::create_session(&state.db, auth.user_id, &role).await?;
    debug!(user_id = %auth.user_id, chat_session = %session.id, "chat session created");
    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state, auth))]
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChatSession>> {
    Ok(Json(owned(&state, id, auth.user_id).await?))
}

#[instrument(skip(state, auth, payload))]
pub async fn post_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }
    let session = owned(&state, id, auth.user_id).await?;
    let role = payload
        .role
        .as_deref()
        .map(|r| role_or_default(Some(r)))
        .unwrap_or(session.role);
    let msg = repo::insert_message(&state.db, id, &payload.message, &payload.response, &role).await?;
    Ok((StatusCode::CREATED, Json(msg)))
}

#[instrument(skip(state, auth))]
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(q): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    owned(&state, id, auth.user_id).await?;
    let messages = repo::list_messages(&state.db, id, q.limit.clamp(1, 200)).await?;
    Ok(Json(messages))
}

#[instrument(skip(state, auth))]
pub async fn get_context(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ContextResponse>> {
    let session = owned(&state, id, auth.user_id).await?;
    Ok(Json(ContextResponse {
        session_id: session.id,
        context: session.context,
    }))
}

#[instrument(skip(state, auth, payload))]
pub async fn put_context(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContextUpdate>,
) -> ApiResult<Json<ContextResponse>> {
    let context = payload
        .context
        .ok_or_else(|| ApiError::bad_request("context is required"))?;
    owned(&state, id, auth.user_id).await?;

    let context = match context {
        Value::Null => None,
        other => Some(other),
    };
    let session = repo::set_context(&state.db, id, context)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat session not found"))?;
    Ok(Json(ContextResponse {
        session_id: session.id,
        context: session.context,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    use crate::{
        app::build_app,
        test_support::{bearer, json_request, send, state_with, user},
        users::ProfileType,
    };

    #[sqlx::test(migrations = "./migrations")]
    async fn context_round_trip_keeps_null_apart_from_missing(db: PgPool) {
        let state = state_with(db).await;
        let owner = user(&state.db, "chat@x.co", ProfileType::Artist).await;
        let auth = bearer(&state, &owner).await;
        let app = build_app(state);

        let (status, session) = send(
            &app,
            json_request("POST", "/api/v1/chat/sessions", Some(&auth), Some(json!({ "role": "artist" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["role"], "artist");
        let uri = format!("/api/v1/chat/sessions/{}/context", session["id"].as_str().unwrap());

        let (status, body) = send(
            &app,
            json_request("PUT", &uri, Some(&auth), Some(json!({ "context": { "mood": "calm" } }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["context"]["mood"], "calm");

        let (status, _) = send(&app, json_request("PUT", &uri, Some(&auth), Some(json!({})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, body) = send(&app, json_request("GET", &uri, Some(&auth), None)).await;
        assert_eq!(body["context"]["mood"], "calm");

        let (status, body) = send(
            &app,
            json_request("PUT", &uri, Some(&auth), Some(json!({ "context": null }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["context"].is_null());
        let (_, body) = send(&app, json_request("GET", &uri, Some(&auth), None)).await;
        assert!(body["context"].is_null());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn messages_newest_first_and_owner_only(db: PgPool) {
        let state = state_with(db).await;
        let owner = user(&state.db, "talker@x.co", ProfileType::Fan).await;
        let stranger = user(&state.db, "lurker@x.co", ProfileType::Fan).await;
        let auth = bearer(&state, &owner).await;
        let other_auth = bearer(&state, &stranger).await;
        let app = build_app(state);

        let (_, session) = send(&app, json_request("POST", "/api/v1/chat/sessions", Some(&auth), None)).await;
        assert_eq!(session["role"], "general");
        let base = format!("/api/v1/chat/sessions/{}", session["id"].as_str().unwrap());
        let messages = format!("{base}/messages");

        for text in ["first", "second"] {
            let (status, _) = send(
                &app,
                json_request("POST", &messages, Some(&auth), Some(json!({ "message": text, "response": "ok" }))),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, _) = send(
            &app,
            json_request("POST", &messages, Some(&auth), Some(json!({ "message": "  ", "response": "" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, list) = send(&app, json_request("GET", &messages, Some(&auth), None)).await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["message"], "second");

        let (status, _) = send(&app, json_request("GET", &base, Some(&other_auth), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, json_request("GET", &base, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
