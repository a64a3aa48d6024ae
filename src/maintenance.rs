use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument};

use crate::{auth, rbac, sessions, state::AppState, tokens};

/// Spawns the periodic cleanup loop. The first run happens one interval
/// after startup.
pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(state.config.maintenance_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_once(&state).await;
        }
    })
}

async fn step<T, F>(name: &'static str, fut: F)
where
    T: Display,
    F: Future<Output = anyhow::Result<T>>,
{
    match fut.await {
        Ok(count) => info!(step = name, %count, "maintenance step done"),
        Err(e) => error!(step = name, error = ?e, "maintenance step failed"),
    }
}

/// One pass over every cleanup job; a failing job does not stop the rest.
#[instrument(skip(state))]
pub async fn run_once(state: &AppState) {
    let db = &state.db;
    step("expire_sessions", sessions::services::cleanup_expired_sessions(db)).await;
    step("revoke_expired_refresh_tokens", tokens::repo::revoke_expired_refresh(db)).await;
    step("revoke_expired_api_tokens", tokens::repo::revoke_expired_api(db)).await;
    step("delete_expired_resets", auth::repo::delete_expired_resets(db)).await;
    step("delete_expired_verifications", auth::repo::delete_expired_verifications(db)).await;
    step("deactivate_expired_roles", rbac::services::cleanup_expired_roles(db)).await;
    let purged = state.limiter.purge_stale();
    info!(step = "purge_rate_limits", count = purged, "maintenance step done");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_once_survives_unreachable_database() {
        let state = AppState::fake();
        state.limiter.check("10.0.0.1|a@b.co");
        run_once(&state).await;
    }

    #[tokio::test]
    async fn failing_step_is_swallowed() {
        step("boom", async { Err::<u64, _>(anyhow::anyhow!("nope")) }).await;
        step("ok", async { Ok::<u64, anyhow::Error>(3) }).await;
    }
}
