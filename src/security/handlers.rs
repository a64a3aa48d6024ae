use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::ApiResult,
    security::{repo, repo_types::SecurityLog},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/security/events", get(list_events))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[instrument(skip(state, auth))]
pub async fn list_events(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<EventsQuery>,
) -> ApiResult<Json<Vec<SecurityLog>>> {
    let limit = q.limit.clamp(1, 200);
    let offset = q.offset.max(0);
    let events = repo::list_for_user(&state.db, auth.user_id, limit, offset).await?;
    Ok(Json(events))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    use crate::{
        app::build_app,
        security,
        test_support::{bearer, json_request, send, state_with, user},
        users::ProfileType,
    };

    #[sqlx::test(migrations = "./migrations")]
    async fn events_are_own_and_newest_first(db: PgPool) {
        let state = state_with(db).await;
        let me = user(&state.db, "audit@x.co", ProfileType::Fan).await;
        let other = user(&state.db, "else@x.co", ProfileType::Fan).await;
        security::record(&state.db, Some(me.id), "login_failed", json!({}), Some("10.0.0.1")).await;
        security::record(&state.db, Some(me.id), "password_changed", json!({}), None).await;
        security::record(&state.db, Some(other.id), "login_failed", json!({}), None).await;
        let auth = bearer(&state, &me).await;
        let app = build_app(state);

        let (status, events) = send(&app, json_request("GET", "/api/v1/security/events", Some(&auth), None)).await;
        assert_eq!(status, StatusCode::OK);
        let events = events.as_array().unwrap();
        assert!(events.iter().all(|e| e["user_id"] == me.id.to_string()));
        let actions: Vec<_> = events.iter().map(|e| e["action"].as_str().unwrap()).collect();
        let changed = actions.iter().position(|a| *a == "password_changed").unwrap();
        let failed = actions.iter().position(|a| *a == "login_failed").unwrap();
        assert!(changed < failed);
        assert_eq!(events[failed]["success"], false);

        let (_, page) = send(&app, json_request("GET", "/api/v1/security/events?limit=1", Some(&auth), None)).await;
        assert_eq!(page.as_array().unwrap().len(), 1);
    }
}
