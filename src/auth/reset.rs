use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use super::{
    password::{check_password_policy, hash_password, PasswordPolicyError},
    repo::{self, PasswordReset},
};
use crate::{
    error::ApiError,
    security,
    sessions,
    state::AppState,
    tokens::secret::{random_hex, sha256_hex},
    users::User,
};

const RESET_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("Too many password reset requests, try again later")]
    TooMany,
    #[error("Invalid reset token")]
    InvalidToken,
    #[error("Reset token has already been used")]
    TokenUsed,
    #[error("Reset token has expired")]
    TokenExpired,
    #[error(transparent)]
    Policy(#[from] PasswordPolicyError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ResetError> for ApiError {
    fn from(e: ResetError) -> Self {
        match e {
            ResetError::TooMany => ApiError::TooManyRequests(e.to_string()),
            ResetError::Internal(inner) => ApiError::Internal(inner),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

fn check_reset(reset: &PasswordReset, now: OffsetDateTime) -> Result<(), ResetError> {
    if reset.used {
        Err(ResetError::TokenUsed)
    } else if reset.expires_at <= now {
        Err(ResetError::TokenExpired)
    } else {
        Ok(())
    }
}

/// Issues a reset token for a known email. Unknown emails succeed silently.
pub async fn request_reset(state: &AppState, email: &str, ip: Option<&str>) -> Result<(), ResetError> {
    let Some(user) = User::find_by_email(&state.db, email).await? else {
        info!("password reset requested for unknown email");
        return Ok(());
    };

    let policy = &state.config.tokens;
    let since = OffsetDateTime::now_utc() - Duration::hours(1);
    if repo::count_resets_since(&state.db, user.id, since).await? >= policy.reset_max_per_hour {
        security::record(
            &state.db,
            Some(user.id),
            "password_reset_rate_limited",
            json!({}),
            ip,
        )
        .await;
        return Err(ResetError::TooMany);
    }

    let token = random_hex(RESET_TOKEN_BYTES);
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(policy.reset_ttl_minutes);
    repo::insert_reset(&state.db, user.id, &sha256_hex(&token), expires_at).await?;

    // No mail provider: the link is delivered through the log.
    info!(
        user_id = %user.id,
        reset_url = %format!("{}/auth/reset-password?token={}", policy.public_base_url, token),
        "password reset issued"
    );
    security::record(
        &state.db,
        Some(user.id),
        "password_reset_requested",
        json!({ "expires_at": expires_at.unix_timestamp() }),
        ip,
    )
    .await;
    Ok(())
}

/// Consumes a reset token, sets the new password and signs the user out
/// everywhere.
pub async fn confirm_reset(
    state: &AppState,
    token: &str,
    new_password: &str,
    ip: Option<&str>,
) -> Result<Uuid, ResetError> {
    let mut tx = state.db.begin().await.map_err(anyhow::Error::from)?;
    let reset = repo::find_reset(&mut *tx, &sha256_hex(token))
        .await?
        .ok_or(ResetError::InvalidToken)?;
    check_reset(&reset, OffsetDateTime::now_utc())?;
    check_password_policy(new_password)?;

    let hash = hash_password(new_password)?;
    User::update_password(&mut *tx, reset.user_id, &hash).await?;
    repo::mark_reset_used(&mut *tx, reset.id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    let revoked = sessions::services::revoke_all_user_sessions(
        &state.db,
        reset.user_id,
        None,
        "password_reset",
    )
    .await?;
    security::record(
        &state.db,
        Some(reset.user_id),
        "password_reset_completed",
        json!({ "sessions_revoked": revoked }),
        ip,
    )
    .await;
    info!(user_id = %reset.user_id, revoked, "password reset completed");
    Ok(reset.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn reset(used: bool, expires_in: Duration) -> PasswordReset {
        PasswordReset {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            used,
            expires_at: OffsetDateTime::now_utc() + expires_in,
        }
    }

    #[test]
    fn used_and_expired_tokens_rejected() {
        let now = OffsetDateTime::now_utc();
        assert!(check_reset(&reset(false, Duration::minutes(10)), now).is_ok());
        assert!(matches!(
            check_reset(&reset(true, Duration::minutes(10)), now),
            Err(ResetError::TokenUsed)
        ));
        assert!(matches!(
            check_reset(&reset(false, Duration::minutes(-1)), now),
            Err(ResetError::TokenExpired)
        ));
    }

    #[test]
    fn reset_errors_map_to_statuses() {
        assert_eq!(ApiError::from(ResetError::TooMany).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::from(ResetError::InvalidToken).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(ResetError::Policy(PasswordPolicyError::TooShort)).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reset_token_is_single_use_and_signs_out(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "forgot@x.co", crate::users::ProfileType::Fan).await;
        let session = sessions::services::create_session(
            &state.db,
            &state.config.session,
            user.id,
            &sessions::SessionMeta::default(),
            false,
        )
        .await
        .unwrap();

        let token = "a1b2c3";
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(15);
        repo::insert_reset(&state.db, user.id, &sha256_hex(token), expires_at).await.unwrap();

        let id = confirm_reset(&state, token, "N3w!Passw0rd", None).await.unwrap();
        assert_eq!(id, user.id);
        let stored = User::find_by_id(&state.db, user.id).await.unwrap().unwrap();
        assert!(crate::auth::password::verify_password("N3w!Passw0rd", &stored.password_hash).unwrap());
        assert!(matches!(
            sessions::services::validate_session(&state.db, session.id).await.unwrap(),
            sessions::SessionCheck::Invalid(_)
        ));

        let again = confirm_reset(&state, token, "An0ther!Passw0rd", None).await;
        assert!(matches!(again, Err(ResetError::TokenUsed)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn weak_password_leaves_token_unused(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "weak@x.co", crate::users::ProfileType::Fan).await;
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(15);
        repo::insert_reset(&state.db, user.id, &sha256_hex("tok"), expires_at).await.unwrap();

        assert!(matches!(confirm_reset(&state, "tok", "short", None).await, Err(ResetError::Policy(_))));
        assert!(confirm_reset(&state, "tok", "N3w!Passw0rd", None).await.is_ok());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn hourly_request_cap(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        crate::test_support::user(&state.db, "spam@x.co", crate::users::ProfileType::Fan).await;
        for _ in 0..state.config.tokens.reset_max_per_hour {
            request_reset(&state, "spam@x.co", None).await.unwrap();
        }
        assert!(matches!(request_reset(&state, "spam@x.co", None).await, Err(ResetError::TooMany)));
        assert!(request_reset(&state, "nobody@x.co", None).await.is_ok());
    }
}
