//! Genre endpoints

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::{ClientContext, PageParams, body, created, no_content, query};
use crate::admission::Served;
use crate::app::AppState;
use crate::catalog::Book;
use crate::db::{CreateGenre, GenreRecord, Paginated, UpdateGenre};
use crate::error::AppResult;

async fn list_genres(
    State(state): State<AppState>,
    ctx: ClientContext,
    params: Result<Query<PageParams>, QueryRejection>,
) -> AppResult<Served<Paginated<GenreRecord>>> {
    let params = query(params)?;
    state.catalog.list_genres(&ctx.subject, params.pagination()).await
}

async fn get_genre(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Served<GenreRecord>> {
    state.catalog.get_genre(&ctx.subject, id).await
}

async fn genre_books(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> AppResult<Served<Paginated<Book>>> {
    let params = query(params)?;
    state
        .catalog
        .genre_books(&ctx.subject, id, params.pagination())
        .await
}

async fn create_genre(
    State(state): State<AppState>,
    ctx: ClientContext,
    payload: Result<Json<CreateGenre>, JsonRejection>,
) -> AppResult<Response> {
    let input = body(payload)?;
    Ok(created(state.catalog.create_genre(&ctx.subject, input).await?))
}

async fn update_genre(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateGenre>, JsonRejection>,
) -> AppResult<Served<GenreRecord>> {
    let input = body(payload)?;
    state.catalog.update_genre(&ctx.subject, id, input).await
}

async fn delete_genre(
    State(state): State<AppState>,
    ctx: ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    Ok(no_content(state.catalog.delete_genre(&ctx.subject, id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/genres", get(list_genres).post(create_genre))
        .route(
            "/genres/{id}",
            get(get_genre).put(update_genre).delete(delete_genre),
        )
        .route("/genres/{id}/books", get(genre_books))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::api::test_support::{call, get, json, send_json, state};

    #[tokio::test]
    async fn test_genre_crud() {
        let state = state().await;
        let payload = json!({"name": "Fantasy", "description": "Swords and sorcery"});
        let response = call(&state, send_json("POST", "/api/genres", &payload, None)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let genre = json(response).await;
        let uri = format!("/api/genres/{}", genre["id"]);

        let response = call(&state, send_json("POST", "/api/genres", &payload, None)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = call(&state, get(&uri)).await;
        assert_eq!(response.headers()["x-cache"], "MISS");
        let response = call(&state, get(&uri)).await;
        assert_eq!(response.headers()["x-cache"], "HIT");

        let rename = json!({"name": "High Fantasy"});
        let response = call(&state, send_json("PUT", &uri, &rename, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = json(call(&state, get(&uri)).await).await;
        assert_eq!(fetched["name"], "High Fantasy");
        assert_eq!(fetched["description"], "Swords and sorcery");

        let listing = json(call(&state, get("/api/genres")).await).await;
        assert_eq!(listing["total"], 1);

        let response = call(&state, send_json("DELETE", &uri, &json!({}), None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(call(&state, get(&uri)).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_genre_books_listing() {
        let state = state().await;
        let request = send_json("POST", "/api/genres", &json!({"name": "Horror"}), None);
        let genre = json(call(&state, request).await).await;
        let genre_id = genre["id"].as_i64().unwrap();

        let book = json!({"title": "Carrie", "genre_ids": [genre_id]});
        let response = call(&state, send_json("POST", "/api/books", &book, None)).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let uri = format!("/api/genres/{}/books", genre_id);
        let body = json(call(&state, get(&uri)).await).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["title"], "Carrie");

        let unknown = json!({"title": "Misery", "genre_ids": [999]});
        let response = call(&state, send_json("POST", "/api/books", &unknown, None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = call(&state, get("/api/genres/999/books")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
