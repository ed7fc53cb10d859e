//! Review endpoints
//!
//! Posting, editing and deleting reviews require a bearer token.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::{ClientContext, PageParams, body, created, query};
use crate::admission::Served;
use crate::app::AppState;
use crate::db::{CreateReview, Paginated, ReviewRecord, UpdateReview};
use crate::error::AppResult;

async fn list_reviews(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(book_id): Path<i64>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> AppResult<Served<Paginated<ReviewRecord>>> {
    let params = query(params)?;
    state
        .catalog
        .list_reviews(&ctx.subject, book_id, params.pagination())
        .await
}

async fn create_review(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(book_id): Path<i64>,
    payload: Result<Json<CreateReview>, JsonRejection>,
) -> AppResult<Response> {
    let principal = ctx.require_principal()?;
    let input = body(payload)?;
    Ok(created(
        state
            .catalog
            .create_review(&ctx.subject, principal, book_id, input)
            .await?,
    ))
}

async fn get_review(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(review_id): Path<i64>,
) -> AppResult<Served<ReviewRecord>> {
    state.catalog.get_review(&ctx.subject, review_id).await
}

async fn update_review(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(review_id): Path<i64>,
    payload: Result<Json<UpdateReview>, JsonRejection>,
) -> AppResult<Served<ReviewRecord>> {
    let principal = ctx.require_principal()?;
    let input = body(payload)?;
    state
        .catalog
        .update_review(&ctx.subject, principal, review_id, input)
        .await
}

async fn delete_review(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(review_id): Path<i64>,
) -> AppResult<Served<ReviewRecord>> {
    let principal = ctx.require_principal()?;
    state
        .catalog
        .delete_review(&ctx.subject, principal, review_id)
        .await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books/{id}/reviews", get(list_reviews).post(create_review))
        .route(
            "/reviews/{id}",
            get(get_review).put(update_review).delete(delete_review),
        )
}
