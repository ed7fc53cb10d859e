//! Identity verification and credential handling
//!
//! Provides:
//! - JWT access token issuance and verification (HS256)
//! - API key generation and hashing
//! - Password hashing with bcrypt

pub mod api_keys;
pub mod passwords;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use api_keys::{GeneratedApiKey, generate_api_key, hash_api_key};
pub use passwords::{hash_password, verify_password};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential required")]
    MissingCredential,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("expected an {expected} token")]
    WrongTokenType { expected: &'static str },
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Identity established from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
}

/// Claims carried by access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,
    pub email: Option<String>,
    /// Always "access" for tokens accepted here
    pub token_type: String,
    pub exp: i64,
    pub iat: i64,
}

/// Turns a presented credential into a [`Principal`].
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Principal, AuthError>;
}

/// HS256 JWT issuer and verifier.
pub struct JwtIdentity {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl JwtIdentity {
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        let secret = secret.trim();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::seconds(lifetime_secs),
        }
    }

    /// Access token lifetime in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime.num_seconds()
    }

    /// Issue an access token for a user.
    pub fn issue(&self, user_id: &str, email: Option<&str>) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            token_type: "access".to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl IdentityVerifier for JwtIdentity {
    fn verify(&self, credential: &str) -> Result<Principal, AuthError> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let data = decode::<AccessTokenClaims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT verification failed");
            AuthError::InvalidToken(e.to_string())
        })?;

        if data.claims.token_type != "access" {
            return Err(AuthError::WrongTokenType { expected: "access" });
        }

        Ok(Principal {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}
