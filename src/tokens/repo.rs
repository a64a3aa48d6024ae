use sqlx::{postgres::PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{ApiToken, RefreshToken};

pub async fn insert_refresh<'e, E: PgExecutor<'e>>(
    ex: E,
    token_hash: &str,
    user_id: Uuid,
    session_id: Uuid,
    rotated_from: Option<Uuid>,
    expires_at: OffsetDateTime,
) -> anyhow::Result<RefreshToken> {
    let row = sqlx::query_as::<_, RefreshToken>(
        r#"
        INSERT INTO refresh_tokens (token_hash, user_id, session_id, rotated_from, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, token_hash, user_id, session_id, rotated_from, is_revoked, expires_at, created_at
        "#,
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(session_id)
    .bind(rotated_from)
    .bind(expires_at)
    .fetch_one(ex)
    .await?;
    Ok(row)
}

pub async fn find_refresh_by_hash(db: &PgPool, token_hash: &str) -> anyhow::Result<Option<RefreshToken>> {
    let row = sqlx::query_as::<_, RefreshToken>(
        r#"
        SELECT id, token_hash, user_id, session_id, rotated_from, is_revoked, expires_at, created_at
        FROM refresh_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Revokes one refresh token; false if it was already revoked.
pub async fn revoke_refresh<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "UPDATE refresh_tokens SET is_revoked = TRUE, updated_at = now() WHERE id = $1 AND NOT is_revoked",
    )
    .bind(id)
    .execute(ex)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn revoke_refresh_for_sessions<'e, E: PgExecutor<'e>>(
    ex: E,
    session_ids: &[Uuid],
) -> anyhow::Result<u64> {
    if session_ids.is_empty() {
        return Ok(0);
    }
    let res = sqlx::query(
        r#"
        UPDATE refresh_tokens SET is_revoked = TRUE, updated_at = now()
        WHERE session_id = ANY($1) AND NOT is_revoked
        "#,
    )
    .bind(session_ids.to_vec())
    .execute(ex)
    .await?;
    Ok(res.rows_affected())
}

pub async fn revoke_expired_refresh(db: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query(
        "UPDATE refresh_tokens SET is_revoked = TRUE, updated_at = now() WHERE expires_at <= now() AND NOT is_revoked",
    )
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}

pub async fn insert_api(
    db: &PgPool,
    token_hash: &str,
    user_id: Uuid,
    scope: &str,
    expires_at: OffsetDateTime,
) -> anyhow::Result<ApiToken> {
    let row = sqlx::query_as::<_, ApiToken>(
        r#"
        INSERT INTO api_tokens (token_hash, user_id, scope, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, token_hash, user_id, scope, is_revoked, expires_at, created_at
        "#,
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(scope)
    .bind(expires_at)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn list_live_api(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<ApiToken>> {
    let rows = sqlx::query_as::<_, ApiToken>(
        r#"
        SELECT id, token_hash, user_id, scope, is_revoked, expires_at, created_at
        FROM api_tokens
        WHERE user_id = $1 AND NOT is_revoked AND expires_at > now()
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_api_by_hash(db: &PgPool, token_hash: &str) -> anyhow::Result<Option<ApiToken>> {
    let row = sqlx::query_as::<_, ApiToken>(
        r#"
        SELECT id, token_hash, user_id, scope, is_revoked, expires_at, created_at
        FROM api_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Revokes a token owned by `user_id`; false when no such live token.
pub async fn revoke_api(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE api_tokens SET is_revoked = TRUE, updated_at = now()
        WHERE id = $1 AND user_id = $2 AND NOT is_revoked
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn revoke_api_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE api_tokens SET is_revoked = TRUE, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn revoke_expired_api(db: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query(
        "UPDATE api_tokens SET is_revoked = TRUE, updated_at = now() WHERE expires_at <= now() AND NOT is_revoked",
    )
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}
