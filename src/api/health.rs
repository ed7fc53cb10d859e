//! Health check endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub database: bool,
    pub websocket_connections: usize,
}

/// Health check - always returns OK if the server is running
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - verifies the database is reachable
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let db_ok = state.db.ping().await.is_ok();
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready: db_ok,
            database: db_ok,
            websocket_connections: state.hub.connection_count(),
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::api::test_support::{call, get, json, state};

    #[tokio::test]
    async fn test_readyz_reports_database_and_connections() {
        let state = state().await;
        let _conn = state.hub.connect(None);

        let response = call(&state, get("/readyz")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            json!({"ready": true, "database": true, "websocket_connections": 1})
        );
    }

    #[tokio::test]
    async fn test_readyz_unavailable_after_pool_closed() {
        let state = state().await;
        state.db.pool().close().await;

        let response = call(&state, get("/readyz")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["database"], false);
    }
}
