//! Application state and HTTP router construction.
//!
//! Used by [main] and by [HttpServerService](crate::services::http_server::HttpServerService)
//! to build the Axum app.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::admission::AdmissionControl;
use crate::api;
use crate::auth::JwtIdentity;
use crate::broadcast::{Hub, HubConfig};
use crate::catalog::{Accounts, Catalog};
use crate::config::Config;
use crate::db::Database;
use crate::graphql::{self, BookshelfSchema, build_schema};

/// Shared state for HTTP handlers (REST, GraphQL, WebSocket).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub catalog: Catalog,
    pub accounts: Accounts,
    pub hub: Arc<Hub>,
    pub schema: BookshelfSchema,
}

impl AppState {
    /// Wire every component around an already-connected database.
    pub fn build(config: Arc<Config>, db: Database) -> Self {
        let identity = Arc::new(JwtIdentity::new(
            &config.jwt_secret,
            config.access_token_lifetime,
        ));
        let hub = Arc::new(Hub::new(identity.clone(), HubConfig::from(config.as_ref())));
        let admission = AdmissionControl::in_memory(&config);
        let accounts = Accounts::new(
            db.clone(),
            admission.limiter().clone(),
            identity,
            hub.clone(),
            config.bcrypt_cost,
            config.admin_api_key.clone(),
        );
        let catalog = Catalog::new(db.clone(), admission, hub.clone());
        let schema = build_schema(catalog.clone());

        Self {
            config,
            db,
            catalog,
            accounts,
            hub,
            schema,
        }
    }

    /// State over a fresh in-memory database with the schema applied.
    pub async fn in_memory(config: Config) -> Result<Self> {
        let db = Database::connect_in_memory().await?;
        Ok(Self::build(Arc::new(config), db))
    }
}

/// Build the full Axum router: /api, /graphql, /ws, health and layers.
/// Returns Router<()> (state fully applied) for use with axum::serve.
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .nest("/api", api::router())
        .merge(api::health::router())
        .merge(api::ws::router())
        .merge(graphql::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
