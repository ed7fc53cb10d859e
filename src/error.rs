//! Application error type shared by REST handlers and GraphQL resolvers

use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::admission::{AdmissionError, RateLimitRejection};
use crate::auth::AuthError;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Rate limit exceeded. Try again in {} seconds.", .0.retry_after_secs())]
    RateLimited(RateLimitRejection),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::RateLimited(_) => "rate_limit_exceeded",
            AppError::ServiceUnavailable(_) => "rate_limit_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::RateLimited(rejection) => AppError::RateLimited(rejection),
            AdmissionError::RateLimitUnavailable => {
                AppError::ServiceUnavailable("Rate limiting is temporarily unavailable".to_string())
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

fn header_value(n: impl ToString) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let AppError::Internal(e) = &self {
            tracing::error!(error = %e, "Request failed");
        }

        let message = match &self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        match &self {
            AppError::RateLimited(rejection) => {
                let retry_after = rejection.retry_after_secs();
                let window = rejection.window.as_secs();
                let body = json!({
                    "error": self.code(),
                    "message": message,
                    "limit": rejection.limit,
                    "window_seconds": window,
                    "retry_after": retry_after,
                });
                (
                    status,
                    [
                        (header::RETRY_AFTER, header_value(retry_after)),
                        (X_RATELIMIT_LIMIT, header_value(rejection.limit)),
                        (X_RATELIMIT_WINDOW, header_value(window)),
                    ],
                    Json(body),
                )
                    .into_response()
            }
            _ => {
                let body = json!({ "error": self.code(), "message": message });
                (status, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rate_limited_response_headers() {
        let err = AppError::from(AdmissionError::RateLimited(RateLimitRejection {
            limit: 3,
            window: Duration::from_secs(60),
            retry_after: Duration::from_millis(39_200),
        }));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "40");
        assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "3");
        assert_eq!(response.headers()[X_RATELIMIT_WINDOW], "60");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::not_found("Book").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(AdmissionError::RateLimitUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(AuthError::MissingCredential).code(),
            "unauthorized"
        );
    }
}
