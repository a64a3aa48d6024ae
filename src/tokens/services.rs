use axum::{extract::FromRef, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    repo,
    repo_types::{ApiToken, RefreshToken},
    secret::{random_hex, sha256_hex},
};
use crate::{
    auth::jwt::JwtKeys,
    error::ApiError,
    security,
    sessions::{self, SessionCheck},
    state::AppState,
    users::User,
};

const REFRESH_TOKEN_BYTES: usize = 40;
const API_TOKEN_BYTES: usize = 32;
pub const DEFAULT_API_SCOPE: &str = "api_access";

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Refresh token not found")]
    NotFound,
    #[error("Refresh token has been revoked")]
    Revoked,
    #[error("Refresh token has expired")]
    Expired,
    #[error("Session is no longer valid")]
    SessionInvalid,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RefreshError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "TOKEN_NOT_FOUND",
            Self::Revoked => "TOKEN_REVOKED",
            Self::Expired => "TOKEN_EXPIRED",
            Self::SessionInvalid => "SESSION_INVALID",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<RefreshError> for ApiError {
    fn from(e: RefreshError) -> Self {
        let status = match e {
            RefreshError::NotFound => StatusCode::NOT_FOUND,
            RefreshError::Internal(inner) => return ApiError::Internal(inner),
            _ => StatusCode::UNAUTHORIZED,
        };
        ApiError::Coded {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Revoked is checked before expiry so reuse of a rotated token is always
/// reported as such.
fn check_refresh(token: &RefreshToken, now: OffsetDateTime) -> Result<(), RefreshError> {
    if token.is_revoked {
        Err(RefreshError::Revoked)
    } else if token.expires_at <= now {
        Err(RefreshError::Expired)
    } else {
        Ok(())
    }
}

/// Signs an access JWT and stores a fresh refresh token for the session.
///
/// With `rotated_from` the old token is claimed in the same transaction;
/// if it was already revoked (a concurrent or replayed use) nothing is
/// issued and `Revoked` is returned.
pub async fn issue_pair(
    state: &AppState,
    user_id: Uuid,
    email: &str,
    session_id: Uuid,
    rotated_from: Option<Uuid>,
) -> Result<TokenPair, RefreshError> {
    let mut tx = state.db.begin().await.map_err(anyhow::Error::from)?;
    if let Some(old) = rotated_from {
        if !repo::revoke_refresh(&mut *tx, old).await? {
            return Err(RefreshError::Revoked);
        }
    }
    let refresh_token = random_hex(REFRESH_TOKEN_BYTES);
    let expires_at =
        OffsetDateTime::now_utc() + Duration::minutes(state.config.jwt.refresh_ttl_minutes);
    repo::insert_refresh(
        &mut *tx,
        &sha256_hex(&refresh_token),
        user_id,
        session_id,
        rotated_from,
        expires_at,
    )
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user_id, session_id, email)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: keys.access_ttl.as_secs(),
    })
}

pub struct Refreshed {
    pub tokens: TokenPair,
    pub session_id: Uuid,
}

/// Exchanges a refresh token for a new pair, rotating on every use.
pub async fn refresh(
    state: &AppState,
    plaintext: &str,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Refreshed, RefreshError> {
    let Some(token) = repo::find_refresh_by_hash(&state.db, &sha256_hex(plaintext)).await? else {
        refresh_failed(state, None, "not_found", ip, user_agent).await;
        return Err(RefreshError::NotFound);
    };

    match check_refresh(&token, OffsetDateTime::now_utc()) {
        Ok(()) => {}
        Err(RefreshError::Revoked) => {
            return Err(reuse_detected(state, &token, ip, user_agent).await);
        }
        Err(e) => {
            repo::revoke_refresh(&state.db, token.id).await?;
            refresh_failed(state, Some(token.user_id), "expired", ip, user_agent).await;
            return Err(e);
        }
    }

    let session_ok = matches!(
        sessions::services::validate_session(&state.db, token.session_id).await?,
        SessionCheck::Valid(ref s) if s.user_id == token.user_id
    );
    let user = match User::find_by_id(&state.db, token.user_id).await? {
        Some(u) if u.is_active && session_ok => u,
        _ => {
            repo::revoke_refresh(&state.db, token.id).await?;
            refresh_failed(state, Some(token.user_id), "session_invalid", ip, user_agent).await;
            return Err(RefreshError::SessionInvalid);
        }
    };

    let tokens = match issue_pair(state, user.id, &user.email, token.session_id, Some(token.id)).await {
        Ok(tokens) => tokens,
        Err(RefreshError::Revoked) => return Err(reuse_detected(state, &token, ip, user_agent).await),
        Err(e) => return Err(e),
    };
    security::record(
        &state.db,
        Some(user.id),
        "token_refreshed",
        json!({ "session_id": token.session_id, "rotated_from": token.id }),
        ip,
    )
    .await;
    info!(user_id = %user.id, session_id = %token.session_id, "refresh token rotated");
    Ok(Refreshed {
        tokens,
        session_id: token.session_id,
    })
}

/// A revoked token was presented again: the session it belongs to is
/// treated as compromised and revoked.
async fn reuse_detected(
    state: &AppState,
    token: &RefreshToken,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> RefreshError {
    warn!(user_id = %token.user_id, session_id = %token.session_id, "revoked refresh token reused");
    if let Err(e) = sessions::services::revoke_session(
        &state.db,
        token.session_id,
        Some(token.user_id),
        "refresh_token_reuse",
    )
    .await
    {
        return RefreshError::Internal(e);
    }
    refresh_failed(state, Some(token.user_id), "revoked", ip, user_agent).await;
    RefreshError::Revoked
}

async fn refresh_failed(
    state: &AppState,
    user_id: Option<Uuid>,
    reason: &str,
    ip: Option<&str>,
    user_agent: Option<&str>,
) {
    security::record(
        &state.db,
        user_id,
        "token_refresh_failed",
        json!({ "reason": reason }),
        ip,
    )
    .await;
    if user_id.is_some() {
        if let Err(e) = sessions::services::detect_suspicious_activity(
            &state.db,
            &state.config.session,
            user_id,
            ip,
            user_agent,
        )
        .await
        {
            warn!(error = %e, "suspicious activity check failed");
        }
    }
}

/// Creates an API token; the plaintext is only ever returned here.
pub async fn create_api_token(
    state: &AppState,
    user_id: Uuid,
    scope: Option<&str>,
    expires_in_days: Option<i64>,
) -> anyhow::Result<(String, ApiToken)> {
    let days = expires_in_days
        .filter(|d| *d > 0)
        .unwrap_or(state.config.tokens.api_token_ttl_days);
    let scope = scope.filter(|s| !s.trim().is_empty()).unwrap_or(DEFAULT_API_SCOPE);
    let plaintext = random_hex(API_TOKEN_BYTES);
    let expires_at = OffsetDateTime::now_utc() + Duration::days(days);
    let row = repo::insert_api(&state.db, &sha256_hex(&plaintext), user_id, scope, expires_at).await?;

    security::record(
        &state.db,
        Some(user_id),
        "api_token_created",
        json!({ "token_id": row.id, "scope": scope, "expires_in_days": days }),
        None,
    )
    .await;
    Ok((plaintext, row))
}

#[derive(Debug)]
pub enum ApiTokenCheck {
    Valid(ApiToken),
    Invalid(&'static str),
}

pub async fn validate_api_token(state: &AppState, plaintext: &str) -> anyhow::Result<ApiTokenCheck> {
    let Some(token) = repo::find_api_by_hash(&state.db, &sha256_hex(plaintext)).await? else {
        return Ok(ApiTokenCheck::Invalid("Token not found"));
    };
    if token.is_revoked {
        return Ok(ApiTokenCheck::Invalid("Token has been revoked"));
    }
    if token.expires_at <= OffsetDateTime::now_utc() {
        repo::revoke_api_by_id(&state.db, token.id).await?;
        return Ok(ApiTokenCheck::Invalid("Token has expired"));
    }
    Ok(ApiTokenCheck::Valid(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn token(is_revoked: bool, expires_in: Duration) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            id: Uuid::new_v4(),
            token_hash: sha256_hex("x"),
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            rotated_from: None,
            is_revoked,
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn refresh_checks_revoked_before_expiry() {
        let now = OffsetDateTime::now_utc();
        assert!(check_refresh(&token(false, Duration::days(1)), now).is_ok());
        assert!(matches!(
            check_refresh(&token(false, Duration::days(-1)), now),
            Err(RefreshError::Expired)
        ));
        assert!(matches!(
            check_refresh(&token(true, Duration::days(-1)), now),
            Err(RefreshError::Revoked)
        ));
    }

    #[test]
    fn refresh_errors_map_to_codes() {
        let not_found: ApiError = RefreshError::NotFound.into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        let revoked = ApiError::from(RefreshError::Revoked).into_response();
        assert_eq!(revoked.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RefreshError::Expired.code(), "TOKEN_EXPIRED");
        assert_eq!(RefreshError::SessionInvalid.code(), "SESSION_INVALID");
        let internal: ApiError = RefreshError::Internal(anyhow::anyhow!("db")).into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn fresh_pair(state: &AppState, email: &str) -> (User, Uuid, TokenPair) {
        let user = crate::test_support::user(&state.db, email, crate::users::ProfileType::Fan).await;
        let session = sessions::services::create_session(
            &state.db,
            &state.config.session,
            user.id,
            &sessions::SessionMeta::default(),
            false,
        )
        .await
        .unwrap();
        let pair = issue_pair(state, user.id, &user.email, session.id, None).await.unwrap();
        (user, session.id, pair)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rotation_invalidates_old_token_and_reuse_kills_session(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let (_, session_id, pair) = fresh_pair(&state, "rotate@x.co").await;

        let next = refresh(&state, &pair.refresh_token, None, None).await.unwrap();
        assert_eq!(next.session_id, session_id);
        assert_ne!(next.tokens.refresh_token, pair.refresh_token);

        let err = refresh(&state, &pair.refresh_token, None, None).await.err().unwrap();
        assert!(matches!(err, RefreshError::Revoked));
        let session = sessions::repo::find_by_id(&state.db, session_id).await.unwrap().unwrap();
        assert_eq!(session.status, sessions::repo_types::REVOKED);

        // The session is gone, so even the rotated token is dead now.
        assert!(refresh(&state, &next.tokens.refresh_token, None, None).await.is_err());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_uses_of_one_token_rotate_once(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        for round in 0..5 {
            let (_, _, pair) = fresh_pair(&state, &format!("race{round}@x.co")).await;
            let (a, b) = tokio::join!(
                refresh(&state, &pair.refresh_token, None, None),
                refresh(&state, &pair.refresh_token, None, None),
            );
            let wins = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
            assert_eq!(wins, 1, "round {round}");
            let loser = if a.is_ok() { b.err() } else { a.err() };
            assert!(matches!(loser, Some(RefreshError::Revoked)));
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_refresh_token_is_not_found(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let err = refresh(&state, "deadbeef", None, None).await.err().unwrap();
        assert!(matches!(err, RefreshError::NotFound));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn api_token_lifecycle(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "api@x.co", crate::users::ProfileType::Artist).await;
        let (plain, row) = create_api_token(&state, user.id, None, None).await.unwrap();
        assert_eq!(row.scope, DEFAULT_API_SCOPE);
        assert!(matches!(validate_api_token(&state, &plain).await.unwrap(), ApiTokenCheck::Valid(_)));

        assert!(repo::revoke_api(&state.db, row.id, user.id).await.unwrap());
        assert!(matches!(validate_api_token(&state, &plain).await.unwrap(), ApiTokenCheck::Invalid(_)));
    }
}
