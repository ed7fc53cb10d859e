//! Book endpoints

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use super::{ClientContext, PageParams, body, created, no_content, query};
use crate::admission::Served;
use crate::app::AppState;
use crate::catalog::Book;
use crate::db::{BookSearch, CreateBook, Paginated, Pagination, UpdateBook};
use crate::error::AppResult;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub author_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn list_books(
    State(state): State<AppState>,
    ctx: ClientContext,
    params: Result<Query<PageParams>, QueryRejection>,
) -> AppResult<Served<Paginated<Book>>> {
    let params = query(params)?;
    state.catalog.list_books(&ctx.subject, params.pagination()).await
}

async fn search_books(
    State(state): State<AppState>,
    ctx: ClientContext,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> AppResult<Served<Paginated<Book>>> {
    let params = query(params)?;
    let page = Pagination::new(params.page, params.per_page);
    let filter = BookSearch {
        query: params.q,
        author_id: params.author_id,
        genre_id: params.genre_id,
    };
    state.catalog.search_books(&ctx.subject, filter, page).await
}

async fn get_book(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Served<Book>> {
    state.catalog.get_book(&ctx.subject, id).await
}

async fn create_book(
    State(state): State<AppState>,
    ctx: ClientContext,
    payload: Result<Json<CreateBook>, JsonRejection>,
) -> AppResult<Response> {
    let input = body(payload)?;
    Ok(created(state.catalog.create_book(&ctx.subject, input).await?))
}

async fn update_book(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateBook>, JsonRejection>,
) -> AppResult<Served<Book>> {
    let input = body(payload)?;
    state.catalog.update_book(&ctx.subject, id, input).await
}

async fn delete_book(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    Ok(no_content(state.catalog.delete_book(&ctx.subject, id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/search", get(search_books))
        .route("/books/{id}", get(get_book).put(update_book).delete(delete_book))
}
