//! Fixtures for tests that run against a migrated database.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use crate::{
    auth::password::hash_password,
    config::AppConfig,
    rbac,
    sessions::{self, SessionMeta},
    state::AppState,
    storage::{MemoryStorage, StorageClient},
    tokens,
    users::{NewUser, ProfileType, User},
};

pub const PASSWORD: &str = "Str0ng!Passw0rd";

/// Test config and in-memory storage over `db`, with the RBAC seed applied.
pub async fn state_with(db: PgPool) -> AppState {
    rbac::seed::seed(&db).await.unwrap();
    AppState::from_parts(
        db,
        Arc::new(AppConfig::for_tests()),
        Arc::new(MemoryStorage::default()) as Arc<dyn StorageClient>,
    )
}

/// Inserts a user with [`PASSWORD`] and grants the role of its profile type.
pub async fn user(db: &PgPool, email: &str, profile_type: ProfileType) -> User {
    let hash = hash_password(PASSWORD).unwrap();
    let user = User::create(
        db,
        &NewUser {
            email,
            password_hash: &hash,
            profile_type,
            username: None,
            first_name: None,
            last_name: None,
        },
    )
    .await
    .unwrap()
    .expect("email not taken");
    rbac::services::assign_role(db, user.id, profile_type.as_str(), None, None)
        .await
        .unwrap();
    user
}

/// `Authorization` value for a fresh session of `user`.
pub async fn bearer(state: &AppState, user: &User) -> String {
    let session = sessions::services::create_session(
        &state.db,
        &state.config.session,
        user.id,
        &SessionMeta::default(),
        false,
    )
    .await
    .unwrap();
    let pair = tokens::services::issue_pair(state, user.id, &user.email, session.id, None)
        .await
        .unwrap();
    format!("Bearer {}", pair.access_token)
}

pub fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        req = req.header(header::AUTHORIZATION, auth);
    }
    match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    }
}

/// Runs one request through a clone of `app`; non-JSON bodies read as `Null`.
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}
