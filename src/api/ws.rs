//! WebSocket endpoints
//!
//! `GET /ws/{channel}?token=<jwt>` upgrades and hands the socket to a
//! connection actor. `GET /ws/stats` reports connections per channel.

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::app::AppState;
use crate::broadcast::HubStats;
use crate::broadcast::connection::run_connection;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

async fn ws_handler(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| run_connection(socket, hub, channel, params.token))
}

async fn ws_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/stats", get(ws_stats))
        .route("/ws/{channel}", get(ws_handler))
}
