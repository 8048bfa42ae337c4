use std::sync::Arc;

mod app;
mod bot;
mod config;
mod conversation;
mod db;
mod error;
mod images;
mod menus;
mod orders;
mod recommend;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod users;

use crate::config::AppConfig;
use crate::db::PgStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "eatwise=debug,axum=info,tower_http=info".to_string());
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

    let config = AppConfig::from_env()?;
    let store = PgStore::connect(&config.database_url).await?;

    // Run migrations if present
    if let Err(e) = sqlx::migrate!("./migrations").run(store.pool()).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }

    let state = AppState::init(config, Arc::new(store)).await?;
    app::serve(app::build_app(state)).await
}
