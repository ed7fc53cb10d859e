//! API key issuance, listing and revocation
//!
//! Requests carrying `X-API-Key` are counted against the key's tier
//! instead of the client IP.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use super::{ClientContext, body, created, no_content};
use crate::admission::Served;
use crate::app::AppState;
use crate::db::ApiKeyRecord;
use crate::error::AppResult;

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

async fn create_api_key(
    State(state): State<AppState>,
    ctx: ClientContext,
    payload: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> AppResult<Response> {
    let principal = ctx.require_principal()?;
    let request = body(payload)?;
    Ok(created(
        state
            .accounts
            .create_api_key(&ctx.subject, principal, &request.name)
            .await?,
    ))
}

async fn list_api_keys(
    State(state): State<AppState>,
    ctx: ClientContext,
) -> AppResult<Served<Vec<ApiKeyRecord>>> {
    let principal = ctx.require_principal()?;
    state.accounts.list_api_keys(&ctx.subject, principal).await
}

async fn get_api_key(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Served<ApiKeyRecord>> {
    let principal = ctx.require_principal()?;
    state.accounts.get_api_key(&ctx.subject, principal, id).await
}

async fn revoke_api_key(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let principal = ctx.require_principal()?;
    Ok(no_content(
        state
            .accounts
            .revoke_api_key(&ctx.subject, principal, id)
            .await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api-keys", get(list_api_keys).post(create_api_key))
        .route("/api-keys/{id}", get(get_api_key).delete(revoke_api_key))
}
