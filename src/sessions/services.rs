use serde_json::json;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    repo,
    repo_types::{Session, ACTIVE, REVOKED, SUSPENDED},
};
use crate::{config::SessionConfig, security, tokens};

/// Client metadata captured when a session is opened.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
}

/// Outcome of checking a session id.
#[derive(Debug)]
pub enum SessionCheck {
    Valid(Session),
    Invalid(&'static str),
}

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Live,
    Inactive,
    Expired,
}

fn classify(session: &Session, now: OffsetDateTime) -> Verdict {
    if session.status != ACTIVE {
        Verdict::Inactive
    } else if session.expires_at <= now {
        Verdict::Expired
    } else {
        Verdict::Live
    }
}

/// How many of `live` existing sessions must go so that, with one more,
/// at most `max` remain.
pub fn evict_count(live: usize, max: usize) -> usize {
    let max = max.max(1);
    if live >= max {
        live - max + 1
    } else {
        0
    }
}

pub fn session_ttl(cfg: &SessionConfig, remember_me: bool) -> Duration {
    if remember_me {
        Duration::minutes(cfg.remember_ttl_minutes)
    } else {
        Duration::minutes(cfg.ttl_minutes)
    }
}

/// Opens a session, evicting the least recently used ones beyond the
/// concurrent limit in the same transaction.
pub async fn create_session(
    db: &PgPool,
    cfg: &SessionConfig,
    user_id: Uuid,
    meta: &SessionMeta,
    remember_me: bool,
) -> anyhow::Result<Session> {
    let expires_at = OffsetDateTime::now_utc() + session_ttl(cfg, remember_me);

    let mut tx = db.begin().await?;
    let live = repo::live_ids_oldest_first(&mut *tx, user_id).await?;
    let evict = evict_count(live.len(), cfg.max_concurrent.max(1) as usize);
    let evicted = if evict > 0 {
        let ids = repo::deactivate(&mut *tx, &live[..evict], REVOKED).await?;
        tokens::repo::revoke_refresh_for_sessions(&mut *tx, &ids).await?;
        ids
    } else {
        Vec::new()
    };
    let session = repo::insert(&mut *tx, user_id, meta, expires_at).await?;
    tx.commit().await?;

    for id in &evicted {
        security::record(
            db,
            Some(user_id),
            "session_revoked",
            json!({ "session_id": id, "reason": "concurrent_session_limit" }),
            meta.ip_address.as_deref(),
        )
        .await;
    }
    security::record(
        db,
        Some(user_id),
        "session_created",
        json!({
            "session_id": session.id,
            "device_info": meta.device_info,
            "user_agent": meta.user_agent,
            "remember_me": remember_me,
        }),
        meta.ip_address.as_deref(),
    )
    .await;

    info!(user_id = %user_id, session_id = %session.id, evicted = evicted.len(), "session created");
    Ok(session)
}

/// Checks that a session is active and unexpired. Expired sessions are
/// marked as such; live ones get their activity timestamp bumped.
pub async fn validate_session(db: &PgPool, session_id: Uuid) -> anyhow::Result<SessionCheck> {
    let Some(session) = repo::find_by_id(db, session_id).await? else {
        return Ok(SessionCheck::Invalid("Session not found"));
    };

    match classify(&session, OffsetDateTime::now_utc()) {
        Verdict::Inactive => Ok(SessionCheck::Invalid("Session is no longer active")),
        Verdict::Expired => {
            repo::mark_expired(db, session.id).await?;
            Ok(SessionCheck::Invalid("Session expired"))
        }
        Verdict::Live => {
            repo::touch(db, session.id).await?;
            Ok(SessionCheck::Valid(session))
        }
    }
}

/// Revokes one session and its refresh tokens. Returns false when the
/// session was not active.
pub async fn revoke_session(
    db: &PgPool,
    session_id: Uuid,
    revoked_by: Option<Uuid>,
    reason: &str,
) -> anyhow::Result<bool> {
    let mut tx = db.begin().await?;
    let changed = repo::deactivate(&mut *tx, &[session_id], REVOKED).await?;
    tokens::repo::revoke_refresh_for_sessions(&mut *tx, &[session_id]).await?;
    tx.commit().await?;

    if changed.is_empty() {
        return Ok(false);
    }
    security::record(
        db,
        revoked_by,
        "session_revoked",
        json!({ "session_id": session_id, "reason": reason }),
        None,
    )
    .await;
    Ok(true)
}

/// Revokes every active session of a user except `except`.
pub async fn revoke_all_user_sessions(
    db: &PgPool,
    user_id: Uuid,
    except: Option<Uuid>,
    reason: &str,
) -> anyhow::Result<usize> {
    let mut tx = db.begin().await?;
    let ids = repo::active_ids_for_user(&mut *tx, user_id, except).await?;
    let changed = repo::deactivate(&mut *tx, &ids, REVOKED).await?;
    tokens::repo::revoke_refresh_for_sessions(&mut *tx, &ids).await?;
    tx.commit().await?;

    security::record(
        db,
        Some(user_id),
        "sessions_bulk_revoked",
        json!({ "count": changed.len(), "except": except, "reason": reason }),
        None,
    )
    .await;
    Ok(changed.len())
}

/// Failed credential attempts that count towards a lockout.
pub const FAILURE_ACTIONS: &[&str] = &["login_failed", "token_refresh_failed"];

/// Counts recent failures for the user (and IP when known). At or above the
/// threshold every active session of the user is suspended.
pub async fn detect_suspicious_activity(
    db: &PgPool,
    cfg: &SessionConfig,
    user_id: Option<Uuid>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> anyhow::Result<bool> {
    if user_id.is_none() && ip_address.is_none() {
        return Ok(false);
    }
    let since = OffsetDateTime::now_utc() - Duration::minutes(cfg.suspicious_window_minutes);
    let failures =
        security::count_recent(db, FAILURE_ACTIONS, user_id, ip_address, since).await?;
    if failures < cfg.suspicious_threshold {
        return Ok(false);
    }

    let mut suspended = 0;
    if let Some(user_id) = user_id {
        let mut tx = db.begin().await?;
        let ids = repo::active_ids_for_user(&mut *tx, user_id, None).await?;
        let changed = repo::deactivate(&mut *tx, &ids, SUSPENDED).await?;
        tokens::repo::revoke_refresh_for_sessions(&mut *tx, &changed).await?;
        tx.commit().await?;
        suspended = changed.len();
    }

    warn!(user_id = ?user_id, ip = ?ip_address, failures, suspended, "suspicious activity detected");
    security::record(
        db,
        user_id,
        "suspicious_activity_detected",
        json!({
            "failed_attempts": failures,
            "window_minutes": cfg.suspicious_window_minutes,
            "suspended_sessions": suspended,
            "user_agent": user_agent,
        }),
        ip_address,
    )
    .await;
    Ok(true)
}

/// Marks stale sessions expired and revokes their refresh tokens.
pub async fn cleanup_expired_sessions(db: &PgPool) -> anyhow::Result<usize> {
    let mut tx = db.begin().await?;
    let ids = repo::expire_stale(&mut *tx).await?;
    tokens::repo::revoke_refresh_for_sessions(&mut *tx, &ids).await?;
    tx.commit().await?;
    Ok(ids.len())
}

/// Hides the last IPv4 octet; other addresses are returned unchanged.
pub fn mask_ip(ip: &str) -> String {
    match ip.parse::<std::net::Ipv4Addr>() {
        Ok(v4) => {
            let [a, b, c, _] = v4.octets();
            format!("{a}.{b}.{c}.***")
        }
        Err(_) => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn session(status: &str, expires_in: Duration) -> Session {
        let now = OffsetDateTime::now_utc();
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: status.into(),
            device_info: None,
            ip_address: None,
            user_agent: None,
            location: None,
            expires_at: now + expires_in,
            last_activity: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn evicts_enough_to_stay_within_limit() {
        assert_eq!(evict_count(0, 5), 0);
        assert_eq!(evict_count(4, 5), 0);
        assert_eq!(evict_count(5, 5), 1);
        assert_eq!(evict_count(7, 5), 3);
        assert_eq!(evict_count(1, 0), 1);
    }

    #[test]
    fn classify_session_states() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(classify(&session(ACTIVE, Duration::hours(1)), now), Verdict::Live);
        assert_eq!(classify(&session(ACTIVE, Duration::hours(-1)), now), Verdict::Expired);
        assert_eq!(classify(&session(REVOKED, Duration::hours(1)), now), Verdict::Inactive);
        assert_eq!(classify(&session(SUSPENDED, Duration::hours(1)), now), Verdict::Inactive);
    }

    #[test]
    fn remember_me_extends_ttl() {
        let cfg = AppConfig::for_tests().session;
        assert_eq!(session_ttl(&cfg, false), Duration::minutes(60));
        assert_eq!(session_ttl(&cfg, true), Duration::minutes(600));
    }

    #[test]
    fn masks_ipv4_only() {
        assert_eq!(mask_ip("192.168.1.42"), "192.168.1.***");
        assert_eq!(mask_ip("::1"), "::1");
        assert_eq!(mask_ip("unknown"), "unknown");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_limit_evicts_least_recently_used(db: PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "many@devices.co", crate::users::ProfileType::Fan).await;
        let cfg = &state.config.session;

        let mut created = Vec::new();
        for _ in 0..cfg.max_concurrent + 1 {
            let s = create_session(&state.db, cfg, user.id, &SessionMeta::default(), false)
                .await
                .unwrap();
            created.push(s.id);
        }

        let live = repo::list_active(&state.db, user.id).await.unwrap();
        assert_eq!(live.len() as i64, cfg.max_concurrent);
        assert!(!live.iter().any(|s| s.id == created[0]));
        let oldest = repo::find_by_id(&state.db, created[0]).await.unwrap().unwrap();
        assert_eq!(oldest.status, REVOKED);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn revoke_all_spares_the_current_session(db: PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "two@devices.co", crate::users::ProfileType::Fan).await;
        let cfg = &state.config.session;
        let keep = create_session(&state.db, cfg, user.id, &SessionMeta::default(), false).await.unwrap();
        let other = create_session(&state.db, cfg, user.id, &SessionMeta::default(), false).await.unwrap();

        let revoked = revoke_all_user_sessions(&state.db, user.id, Some(keep.id), "test").await.unwrap();
        assert_eq!(revoked, 1);
        assert!(matches!(validate_session(&state.db, keep.id).await.unwrap(), SessionCheck::Valid(_)));
        assert!(matches!(validate_session(&state.db, other.id).await.unwrap(), SessionCheck::Invalid(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failures_at_threshold_suspend_sessions(db: PgPool) {
        let state = crate::test_support::state_with(db).await;
        let user = crate::test_support::user(&state.db, "target@x.co", crate::users::ProfileType::Fan).await;
        let cfg = &state.config.session;
        let live = create_session(&state.db, cfg, user.id, &SessionMeta::default(), false).await.unwrap();

        for _ in 0..cfg.suspicious_threshold - 1 {
            security::record(&state.db, Some(user.id), "login_failed", json!({}), Some("10.0.0.9")).await;
        }
        assert!(!detect_suspicious_activity(&state.db, cfg, Some(user.id), Some("10.0.0.9"), None).await.unwrap());

        security::record(&state.db, Some(user.id), "token_refresh_failed", json!({}), Some("10.0.0.9")).await;
        assert!(detect_suspicious_activity(&state.db, cfg, Some(user.id), Some("10.0.0.9"), None).await.unwrap());
        let session = repo::find_by_id(&state.db, live.id).await.unwrap().unwrap();
        assert_eq!(session.status, SUSPENDED);
    }
}
