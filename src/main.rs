mod app;
mod auth;
mod chat;
mod config;
mod error;
mod maintenance;
mod profiles;
mod rate_limit;
mod rbac;
mod security;
mod sessions;
mod state;
mod storage;
mod tasks;
#[cfg(test)]
mod test_support;
mod tokens;
mod tracks;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "indii=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init().await?;

    sqlx::migrate!("./migrations").run(&state.db).await?;
    rbac::seed::seed(&state.db).await?;

    maintenance::spawn(state.clone());

    app::serve(app::build_app(state)).await
}
