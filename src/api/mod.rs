//! REST API route definitions
//!
//! Every handler goes through [`Catalog`](crate::catalog::Catalog) or
//! [`Accounts`](crate::catalog::Accounts), so admission control is applied
//! identically to the GraphQL facade.

pub mod api_keys;
pub mod auth;
pub mod authors;
pub mod books;
pub mod extract;
pub mod genres;
pub mod health;
pub mod reviews;
pub mod ws;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::admission::{RateLimitStatus, Served, Source};
use crate::app::AppState;
use crate::db::Pagination;
use crate::error::{AppError, AppResult, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};

pub use extract::ClientContext;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Routes nested under `/api`
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(books::router())
        .merge(authors::router())
        .merge(genres::router())
        .merge(reviews::router())
        .merge(auth::router())
        .merge(api_keys::router())
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.per_page)
    }
}

/// Unwrap a JSON body, turning rejections into a 400 with the JSON error shape.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

pub fn query<T>(params: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    params
        .map(|Query(value)| value)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

fn apply_rate_headers(headers: &mut HeaderMap, rate: &RateLimitStatus) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(rate.limit));
    if let Some(remaining) = rate.remaining {
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    }
}

impl<T: Serialize> IntoResponse for Served<T> {
    fn into_response(self) -> Response {
        let mut response = Json(self.value).into_response();
        let headers = response.headers_mut();
        apply_rate_headers(headers, &self.rate);
        headers.insert(
            X_CACHE,
            HeaderValue::from_static(match self.source {
                Source::Cache => "HIT",
                Source::Computed => "MISS",
            }),
        );
        response
    }
}

pub fn created<T: Serialize>(served: Served<T>) -> Response {
    (StatusCode::CREATED, served).into_response()
}

pub fn no_content(served: Served<()>) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_rate_headers(response.headers_mut(), &served.rate);
    response
}
