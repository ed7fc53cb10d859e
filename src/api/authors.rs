//! Author endpoints

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::{ClientContext, PageParams, body, created, no_content, query};
use crate::admission::Served;
use crate::app::AppState;
use crate::catalog::Book;
use crate::db::{AuthorRecord, CreateAuthor, Paginated, UpdateAuthor};
use crate::error::AppResult;

async fn list_authors(
    State(state): State<AppState>,
    ctx: ClientContext,
    params: Result<Query<PageParams>, QueryRejection>,
) -> AppResult<Served<Paginated<AuthorRecord>>> {
    let params = query(params)?;
    state.catalog.list_authors(&ctx.subject, params.pagination()).await
}

async fn get_author(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Served<AuthorRecord>> {
    state.catalog.get_author(&ctx.subject, id).await
}

async fn author_books(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> AppResult<Served<Paginated<Book>>> {
    let params = query(params)?;
    state
        .catalog
        .author_books(&ctx.subject, id, params.pagination())
        .await
}

async fn create_author(
    State(state): State<AppState>,
    ctx: ClientContext,
    payload: Result<Json<CreateAuthor>, JsonRejection>,
) -> AppResult<Response> {
    let input = body(payload)?;
    Ok(created(state.catalog.create_author(&ctx.subject, input).await?))
}

async fn update_author(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateAuthor>, JsonRejection>,
) -> AppResult<Served<AuthorRecord>> {
    let input = body(payload)?;
    state.catalog.update_author(&ctx.subject, id, input).await
}

async fn delete_author(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    Ok(no_content(state.catalog.delete_author(&ctx.subject, id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/authors", get(list_authors).post(create_author))
        .route(
            "/authors/{id}",
            get(get_author).put(update_author).delete(delete_author),
        )
        .route("/authors/{id}/books", get(author_books))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::test_support::{call, get, json, send_json, state};

    #[tokio::test]
    async fn test_author_books_listing() {
        let state = state().await;
        let request = send_json("POST", "/api/authors", &json!({"name": "Iain M. Banks"}), None);
        let author = json(call(&state, request).await).await;
        let author_id = author["id"].as_i64().unwrap();

        call(
            &state,
            send_json(
                "POST",
                "/api/books",
                &json!({"title": "Excession", "author_ids": [author_id]}),
                None,
            ),
        )
        .await;

        let response = call(&state, get(&format!("/api/authors/{}/books", author_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["authors"][0]["name"], "Iain M. Banks");

        let response = call(&state, get("/api/authors")).await;
        assert_eq!(json(response).await["total"], 1);
    }

    #[tokio::test]
    async fn test_update_author() {
        let state = state().await;
        let request = send_json("POST", "/api/authors", &json!({"name": "Le Guin"}), None);
        let author = json(call(&state, request).await).await;
        let uri = format!("/api/authors/{}", author["id"]);

        let rename = json!({"name": "Ursula K. Le Guin", "bio": "Earthsea"});
        let response = call(&state, send_json("PUT", &uri, &rename, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["name"], "Ursula K. Le Guin");

        let fetched = json(call(&state, get(&uri)).await).await;
        assert_eq!(fetched["bio"], "Earthsea");

        let response = call(&state, send_json("PUT", &uri, &json!({"name": ""}), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let missing = send_json("PUT", "/api/authors/999", &json!({}), None);
        assert_eq!(call(&state, missing).await.status(), StatusCode::NOT_FOUND);
    }
}
