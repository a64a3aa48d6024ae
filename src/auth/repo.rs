use sqlx::{postgres::PgExecutor, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct PasswordReset {
    pub id: Uuid,
    pub user_id: Uuid,
    pub used: bool,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub id: Uuid,
    pub identifier: String,
    pub expires_at: OffsetDateTime,
}

pub async fn count_resets_since(db: &PgPool, user_id: Uuid, since: OffsetDateTime) -> anyhow::Result<i64> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM password_resets WHERE user_id = $1 AND created_at > $2",
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(db)
    .await?;
    Ok(n)
}

pub async fn insert_reset(
    db: &PgPool,
    user_id: Uuid,
    token_hash: &str,
    expires_at: OffsetDateTime,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO password_resets (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn find_reset<'e, E: PgExecutor<'e>>(ex: E, token_hash: &str) -> anyhow::Result<Option<PasswordReset>> {
    let row = sqlx::query_as::<_, PasswordReset>(
        "SELECT id, user_id, used, expires_at FROM password_resets WHERE token_hash = $1 FOR UPDATE",
    )
    .bind(token_hash)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

pub async fn mark_reset_used<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE password_resets SET used = TRUE WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Rows stay for an hour past expiry so the hourly request cap still sees them.
pub async fn delete_expired_resets(db: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM password_resets WHERE expires_at <= now() - interval '1 hour'")
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count_verifications_since(
    db: &PgPool,
    identifier: &str,
    since: OffsetDateTime,
) -> anyhow::Result<i64> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_tokens WHERE identifier = $1 AND created_at > $2",
    )
    .bind(identifier)
    .bind(since)
    .fetch_one(db)
    .await?;
    Ok(n)
}

pub async fn insert_verification(
    db: &PgPool,
    identifier: &str,
    token_hash: &str,
    expires_at: OffsetDateTime,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO verification_tokens (identifier, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(identifier)
    .bind(token_hash)
    .bind(expires_at)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_verification<'e, E: PgExecutor<'e>>(
    ex: E,
    token_hash: &str,
) -> anyhow::Result<Option<VerificationToken>> {
    let row = sqlx::query_as::<_, VerificationToken>(
        "SELECT id, identifier, expires_at FROM verification_tokens WHERE token_hash = $1 FOR UPDATE",
    )
    .bind(token_hash)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

pub async fn delete_verification<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn delete_expired_verifications(db: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM verification_tokens WHERE expires_at <= now()")
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}
