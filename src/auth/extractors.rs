use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::{
    error::ApiError,
    sessions::{services::validate_session, SessionCheck},
    state::AppState,
};

/// Caller identity taken from a Bearer access token whose session is
/// still active.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub email: String,
}

pub(crate) fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header"))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::unauthorized("Invalid or expired token")
        })?;

        match validate_session(&state.db, claims.sid).await? {
            SessionCheck::Valid(session) if session.user_id == claims.sub => Ok(AuthUser {
                user_id: claims.sub,
                session_id: claims.sid,
                email: claims.email,
            }),
            SessionCheck::Valid(_) => Err(ApiError::unauthorized("Session mismatch")),
            SessionCheck::Invalid(reason) => {
                warn!(user_id = %claims.sub, session_id = %claims.sid, reason, "session rejected");
                Err(ApiError::unauthorized(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/me");
        if let Some(h) = header {
            req = req.header("authorization", h);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))).unwrap(), "abc");
        assert_eq!(bearer_token(&parts(Some("bearer abc"))).unwrap(), "abc");
        assert!(bearer_token(&parts(Some("Basic abc"))).is_err());
        assert!(bearer_token(&parts(None)).is_err());
    }

    #[tokio::test]
    async fn garbage_token_rejected_before_session_lookup() {
        let state = AppState::fake();
        let mut p = parts(Some("Bearer not-a-jwt"));
        let err = AuthUser::from_request_parts(&mut p, &state).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
