//! Bookshelf Backend - catalogue API with admission control and live updates
//!
//! REST lives under /api, GraphQL at /graphql and WebSocket channels at /ws/{channel}.

mod admission;
mod api;
mod app;
mod auth;
mod broadcast;
mod catalog;
mod config;
mod db;
mod error;
mod graphql;
mod services;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::{Config, LogFormat};
use crate::db::Database;
use crate::services::{DatabaseService, HeartbeatService, HttpServerService, ServicesManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bookshelf=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting Bookshelf Backend");

    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database connected");

    let state = AppState::build(config.clone(), db.clone());

    let services = ServicesManager::new();
    services.register(Arc::new(DatabaseService::new(db))).await;
    services
        .register(Arc::new(HeartbeatService::new(
            state.hub.clone(),
            config.ws_heartbeat_interval,
        )))
        .await;
    services.register(Arc::new(HttpServerService::new(state))).await;
    services.start_all().await?;
    for (name, health) in services.health_all().await {
        tracing::info!(service = %name, status = ?health.status, "Service health");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    services.stop_all().await?;

    Ok(())
}
