use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::repo_types::SecurityLog;

/// An action counts as successful unless its name says otherwise.
pub fn is_success(action: &str) -> bool {
    !action.contains("failed")
}

/// Appends an audit event. Write failures are logged and swallowed so the
/// request that triggered the event still completes.
pub async fn record(
    db: &PgPool,
    user_id: Option<Uuid>,
    action: &str,
    details: serde_json::Value,
    ip_address: Option<&str>,
) {
    let res = sqlx::query(
        r#"
        INSERT INTO security_logs (user_id, action, details, ip_address, success)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(details)
    .bind(ip_address)
    .bind(is_success(action))
    .execute(db)
    .await;

    if let Err(e) = res {
        warn!(error = %e, action, "security log write failed");
    }
}

/// Number of `actions` events since `since`, narrowed by user and/or IP.
pub async fn count_recent(
    db: &PgPool,
    actions: &[&str],
    user_id: Option<Uuid>,
    ip_address: Option<&str>,
    since: OffsetDateTime,
) -> anyhow::Result<i64> {
    let actions: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM security_logs
        WHERE action = ANY($1)
          AND created_at > $2
          AND ($3::uuid IS NULL OR user_id = $3)
          AND ($4::text IS NULL OR ip_address = $4)
        "#,
    )
    .bind(actions)
    .bind(since)
    .bind(user_id)
    .bind(ip_address)
    .fetch_one(db)
    .await?;
    Ok(count)
}

pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<SecurityLog>> {
    let rows = sqlx::query_as::<_, SecurityLog>(
        r#"
        SELECT id, user_id, action, details, ip_address, success, created_at
        FROM security_logs
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_derived_from_action_name() {
        assert!(is_success("login_success"));
        assert!(is_success("session_revoked"));
        assert!(!is_success("login_failed"));
        assert!(!is_success("token_refresh_failed"));
    }
}
