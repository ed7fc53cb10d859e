//! Request identity extraction
//!
//! Resolves who a request is counted against (API key or client IP) and,
//! when a bearer token is present, who the caller is.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::admission::Subject;
use crate::app::AppState;
use crate::auth::{IdentityVerifier, Principal};
use crate::error::{AppError, AppResult};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct ClientContext {
    pub subject: Subject,
    pub principal: Option<Principal>,
}

impl ClientContext {
    pub fn require_principal(&self) -> AppResult<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
    }
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
pub fn client_ip(parts: &Parts) -> String {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for").and_then(|v| v.split(',').next()) {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    if let Some(real) = header("x-real-ip") {
        return real.to_string();
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl FromRequestParts<AppState> for ClientContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let principal = match extract_token(&parts.headers) {
            Some(token) => Some(state.accounts.identity().verify(&token)?),
            None => None,
        };

        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let subject = match api_key {
            Some(key) => state.accounts.resolve_api_key(&key).await?,
            None => Subject::Ip(client_ip(parts)),
        };

        Ok(Self { subject, principal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_client_ip_precedence() {
        assert_eq!(
            client_ip(&parts(&[
                ("x-forwarded-for", "198.51.100.1, 10.0.0.1"),
                ("x-real-ip", "10.0.0.9"),
            ])),
            "198.51.100.1"
        );
        assert_eq!(client_ip(&parts(&[("x-real-ip", "10.0.0.9")])), "10.0.0.9");
        assert_eq!(client_ip(&parts(&[])), "unknown");

        let mut with_peer = parts(&[]);
        with_peer
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 5], 4000))));
        assert_eq!(client_ip(&with_peer), "192.0.2.5");
    }

    #[test]
    fn test_extract_token() {
        let p = parts(&[("authorization", "Bearer abc")]);
        assert_eq!(extract_token(&p.headers).as_deref(), Some("abc"));
        let p = parts(&[("authorization", "Basic abc")]);
        assert_eq!(extract_token(&p.headers), None);
    }
}
