use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use super::repo;
use crate::{
    error::ApiError,
    security,
    state::AppState,
    tokens::secret::{random_hex, sha256_hex},
    users::User,
};

const VERIFICATION_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Too many verification emails requested, try again later")]
    TooMany,
    #[error("Invalid verification token")]
    InvalidToken,
    #[error("Verification token has expired")]
    Expired,
    #[error("Email is already verified")]
    AlreadyVerified,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<VerificationError> for ApiError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::TooMany => ApiError::TooManyRequests(e.to_string()),
            VerificationError::AlreadyVerified => ApiError::conflict(e.to_string()),
            VerificationError::Internal(inner) => ApiError::Internal(inner),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

pub fn verification_url(base: &str, token: &str) -> String {
    format!("{}/auth/verify-email?token={}", base.trim_end_matches('/'), token)
}

/// Issues a verification token for the user's email, capped per day.
pub async fn issue(state: &AppState, user: &User) -> Result<(), VerificationError> {
    let policy = &state.config.tokens;
    let since = OffsetDateTime::now_utc() - Duration::days(1);
    if repo::count_verifications_since(&state.db, &user.email, since).await?
        >= policy.verification_max_per_day
    {
        return Err(VerificationError::TooMany);
    }

    let token = random_hex(VERIFICATION_TOKEN_BYTES);
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(policy.verification_ttl_minutes);
    repo::insert_verification(&state.db, &user.email, &sha256_hex(&token), expires_at).await?;

    // No mail provider: the link is delivered through the log.
    info!(
        user_id = %user.id,
        verify_url = %verification_url(&policy.public_base_url, &token),
        "email verification issued"
    );
    security::record(
        &state.db,
        Some(user.id),
        "email_verification_sent",
        json!({ "email": user.email }),
        None,
    )
    .await;
    Ok(())
}

pub async fn resend(state: &AppState, user: &User) -> Result<(), VerificationError> {
    if user.email_verified_at.is_some() {
        return Err(VerificationError::AlreadyVerified);
    }
    issue(state, user).await
}

/// Consumes a token and marks the owning email verified.
pub async fn verify(state: &AppState, token: &str) -> Result<Uuid, VerificationError> {
    let mut tx = state.db.begin().await.map_err(anyhow::Error::from)?;
    let row = repo::find_verification(&mut *tx, &sha256_hex(token))
        .await?
        .ok_or(VerificationError::InvalidToken)?;

    if row.expires_at <= OffsetDateTime::now_utc() {
        repo::delete_verification(&mut *tx, row.id).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;
        return Err(VerificationError::Expired);
    }

    let user = User::find_by_email(&state.db, &row.identifier)
        .await?
        .ok_or(VerificationError::InvalidToken)?;
    User::mark_email_verified(&mut *tx, user.id).await?;
    repo::delete_verification(&mut *tx, row.id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    security::record(&state.db, Some(user.id), "email_verified", json!({}), None).await;
    info!(user_id = %user.id, "email verified");
    Ok(user.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn url_joins_base_and_token() {
        assert_eq!(
            verification_url("http://localhost:9000/", "abc"),
            "http://localhost:9000/auth/verify-email?token=abc"
        );
    }

    #[test]
    fn verification_errors_map_to_statuses() {
        assert_eq!(ApiError::from(VerificationError::AlreadyVerified).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(VerificationError::Expired).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(VerificationError::TooMany).status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn daily_cap_on_issued_tokens(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "verify@x.co", crate::users::ProfileType::Fan).await;
        for _ in 0..state.config.tokens.verification_max_per_day {
            issue(&state, &user).await.unwrap();
        }
        assert!(matches!(issue(&state, &user).await, Err(VerificationError::TooMany)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn verify_consumes_token_once(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "once@x.co", crate::users::ProfileType::Fan).await;
        let expires_at = OffsetDateTime::now_utc() + Duration::hours(1);
        repo::insert_verification(&state.db, &user.email, &sha256_hex("v-token"), expires_at)
            .await
            .unwrap();

        assert_eq!(verify(&state, "v-token").await.unwrap(), user.id);
        let user = User::find_by_id(&state.db, user.id).await.unwrap().unwrap();
        assert!(user.email_verified_at.is_some());
        assert!(matches!(verify(&state, "v-token").await, Err(VerificationError::InvalidToken)));
        assert!(matches!(resend(&state, &user).await, Err(VerificationError::AlreadyVerified)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_token_rejected(db: sqlx::PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "late@x.co", crate::users::ProfileType::Fan).await;
        let expires_at = OffsetDateTime::now_utc() - Duration::minutes(1);
        repo::insert_verification(&state.db, &user.email, &sha256_hex("old"), expires_at)
            .await
            .unwrap();
        assert!(matches!(verify(&state, "old").await, Err(VerificationError::Expired)));
    }
}
