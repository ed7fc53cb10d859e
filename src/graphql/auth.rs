//! Request context and error mapping for resolvers

use async_graphql::{Context, Error, ErrorExtensions, Result};

use crate::api::ClientContext;
use crate::auth::Principal;
use crate::error::AppError;

/// Extension trait to get the caller's identity from the GraphQL context
pub trait ClientExt {
    fn client(&self) -> Result<&ClientContext>;

    /// The bearer-token caller, or an `UNAUTHORIZED` error
    fn principal(&self) -> Result<&Principal> {
        self.client()?.require_principal().map_err(|e| e.extend())
    }
}

impl<'a> ClientExt for Context<'a> {
    fn client(&self) -> Result<&ClientContext> {
        self.data_opt::<ClientContext>().ok_or_else(|| {
            Error::new("Request context missing").extend_with(|_, e| e.set("code", "INTERNAL"))
        })
    }
}

impl ErrorExtensions for AppError {
    fn extend(&self) -> Error {
        let message = match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        Error::new(message).extend_with(|_, e| {
            e.set("code", self.code().to_uppercase());
            if let AppError::RateLimited(rejection) = self {
                e.set("retryAfter", rejection.retry_after_secs());
                e.set("limit", rejection.limit);
            }
        })
    }
}
