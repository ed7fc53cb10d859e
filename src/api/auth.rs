//! Registration and login

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::Response;
use axum::routing::post;
use axum::Router;

use super::{ClientContext, body, created};
use crate::admission::Served;
use crate::app::AppState;
use crate::catalog::TokenResponse;
use crate::catalog::accounts::{LoginRequest, RegisterRequest};
use crate::error::AppResult;

async fn register(
    State(state): State<AppState>,
    ctx: ClientContext,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request = body(payload)?;
    Ok(created(state.accounts.register(&ctx.subject, request).await?))
}

async fn login(
    State(state): State<AppState>,
    ctx: ClientContext,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Served<TokenResponse>> {
    let request = body(payload)?;
    state.accounts.login(&ctx.subject, request).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}
