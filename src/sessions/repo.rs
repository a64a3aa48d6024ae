use sqlx::{postgres::PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo_types::{Session, SessionStats, ACTIVE, EXPIRED, REVOKED, SUSPENDED},
    services::SessionMeta,
};

const SESSION_COLUMNS: &str = "id, user_id, status, device_info, ip_address, user_agent, \
     location, expires_at, last_activity, created_at, updated_at";

pub async fn insert<'e, E: PgExecutor<'e>>(
    ex: E,
    user_id: Uuid,
    meta: &SessionMeta,
    expires_at: OffsetDateTime,
) -> anyhow::Result<Session> {
    let session = sqlx::query_as::<_, Session>(&format!(
        r#"
        INSERT INTO sessions (user_id, device_info, ip_address, user_agent, location, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(meta.device_info.as_deref())
    .bind(meta.ip_address.as_deref())
    .bind(meta.user_agent.as_deref())
    .bind(meta.location.as_deref())
    .bind(expires_at)
    .fetch_one(ex)
    .await?;
    Ok(session)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Session>> {
    let session = sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(session)
}

/// Live sessions of a user, least recently used first.
pub async fn live_ids_oldest_first<'e, E: PgExecutor<'e>>(
    ex: E,
    user_id: Uuid,
) -> anyhow::Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM sessions
        WHERE user_id = $1 AND status = $2 AND expires_at > now()
        ORDER BY last_activity ASC
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(ACTIVE)
    .fetch_all(ex)
    .await?;
    Ok(ids)
}

pub async fn active_ids_for_user<'e, E: PgExecutor<'e>>(
    ex: E,
    user_id: Uuid,
    except: Option<Uuid>,
) -> anyhow::Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM sessions
        WHERE user_id = $1 AND status = $2 AND ($3::uuid IS NULL OR id <> $3)
        "#,
    )
    .bind(user_id)
    .bind(ACTIVE)
    .bind(except)
    .fetch_all(ex)
    .await?;
    Ok(ids)
}

/// Moves the given sessions out of `active`; returns the ids actually changed.
pub async fn deactivate<'e, E: PgExecutor<'e>>(
    ex: E,
    ids: &[Uuid],
    status: &str,
) -> anyhow::Result<Vec<Uuid>> {
    let changed = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE sessions SET status = $2, updated_at = now()
        WHERE id = ANY($1) AND status = $3
        RETURNING id
        "#,
    )
    .bind(ids.to_vec())
    .bind(status)
    .bind(ACTIVE)
    .fetch_all(ex)
    .await?;
    Ok(changed)
}

pub async fn touch(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE sessions SET last_activity = now() WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn mark_expired(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE sessions SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(EXPIRED)
        .execute(db)
        .await?;
    Ok(())
}

/// Active sessions whose expiry has passed become `expired`.
pub async fn expire_stale<'e, E: PgExecutor<'e>>(ex: E) -> anyhow::Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE sessions SET status = $1, updated_at = now()
        WHERE status = $2 AND expires_at <= now()
        RETURNING id
        "#,
    )
    .bind(EXPIRED)
    .bind(ACTIVE)
    .fetch_all(ex)
    .await?;
    Ok(ids)
}

pub async fn list_active(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Session>> {
    let rows = sqlx::query_as::<_, Session>(&format!(
        r#"
        SELECT {SESSION_COLUMNS} FROM sessions
        WHERE user_id = $1 AND status = $2 AND expires_at > now()
        ORDER BY last_activity DESC
        "#
    ))
    .bind(user_id)
    .bind(ACTIVE)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn stats(db: &PgPool, user_id: Uuid) -> anyhow::Result<SessionStats> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM sessions WHERE user_id = $1 GROUP BY status",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let mut stats = SessionStats::default();
    for (status, count) in rows {
        match status.as_str() {
            ACTIVE => stats.active = count,
            REVOKED => stats.revoked = count,
            EXPIRED => stats.expired = count,
            SUSPENDED => stats.suspended = count,
            _ => {}
        }
    }
    Ok(stats)
}
