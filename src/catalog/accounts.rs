//! Registration, login and API key issuance

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::user_id_of;
use crate::admission::{EndpointClass, RateLimiter, Served, Source, Subject};
use crate::auth::{
    JwtIdentity, Principal, generate_api_key, hash_api_key, hash_password, verify_password,
};
use crate::broadcast::{DomainEvent, Hub};
use crate::db::{ApiKeyRecord, CreateApiKey, CreateUser, Database, is_unique_violation};
use crate::error::{AppError, AppResult};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Returned once; the plain key is never stored.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiKey {
    pub id: i64,
    pub name: String,
    pub key: String,
    pub key_prefix: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct Accounts {
    db: Database,
    limiter: RateLimiter,
    identity: Arc<JwtIdentity>,
    hub: Arc<Hub>,
    bcrypt_cost: u32,
    admin_api_key: Option<String>,
}

impl Accounts {
    pub fn new(
        db: Database,
        limiter: RateLimiter,
        identity: Arc<JwtIdentity>,
        hub: Arc<Hub>,
        bcrypt_cost: u32,
        admin_api_key: Option<String>,
    ) -> Self {
        Self {
            db,
            limiter,
            identity,
            hub,
            bcrypt_cost,
            admin_api_key,
        }
    }

    pub fn identity(&self) -> &JwtIdentity {
        &self.identity
    }

    fn token_for(&self, user_id: i64, email: &str) -> AppResult<TokenResponse> {
        Ok(TokenResponse {
            access_token: self.identity.issue(&user_id.to_string(), Some(email))?,
            token_type: "bearer".to_string(),
            expires_in: self.identity.lifetime_secs(),
        })
    }

    pub async fn register(
        &self,
        subject: &Subject,
        request: RegisterRequest,
    ) -> AppResult<Served<TokenResponse>> {
        let rate = self.limiter.check(subject, EndpointClass::Write).await?;

        let email = request.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AppError::BadRequest("email is not valid".into()));
        }
        if request.username.trim().is_empty() {
            return Err(AppError::BadRequest("username must not be empty".into()));
        }
        if request.password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::BadRequest(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let cost = self.bcrypt_cost;
        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .context("Password hashing task failed")??;

        let user = self
            .db
            .users()
            .create(&CreateUser {
                email,
                username: request.username.trim().to_string(),
                password_hash,
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("Email already registered".into())
                } else {
                    AppError::Internal(e)
                }
            })?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(Served {
            value: self.token_for(user.id, &user.email)?,
            source: Source::Computed,
            rate,
        })
    }

    pub async fn login(
        &self,
        subject: &Subject,
        request: LoginRequest,
    ) -> AppResult<Served<TokenResponse>> {
        let rate = self.limiter.check(subject, EndpointClass::Write).await?;
        let invalid = || AppError::Unauthorized("Invalid email or password".into());

        let user = self
            .db
            .users()
            .get_by_email(&request.email)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(invalid)?;

        let hash = user.password_hash.clone();
        let password = request.password;
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .context("Password verification task failed")?;
        if !valid {
            return Err(invalid());
        }

        tracing::debug!(user_id = user.id, "User logged in");
        Ok(Served {
            value: self.token_for(user.id, &user.email)?,
            source: Source::Computed,
            rate,
        })
    }

    pub async fn create_api_key(
        &self,
        subject: &Subject,
        principal: &Principal,
        name: &str,
    ) -> AppResult<Served<IssuedApiKey>> {
        let rate = self.limiter.check(subject, EndpointClass::Write).await?;
        let user_id = user_id_of(principal)?;
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }

        let key = generate_api_key();
        let record = self
            .db
            .api_keys()
            .create(&CreateApiKey {
                name: name.trim().to_string(),
                key_hash: key.hash,
                key_prefix: key.prefix,
                user_id: Some(user_id),
            })
            .await?;

        tracing::info!(api_key_id = record.id, user_id, "API key issued");
        self.hub.publish(&DomainEvent::user_notification(
            user_id,
            "api_key_created",
            json!({ "name": record.name, "key_prefix": record.key_prefix }),
        ));

        Ok(Served {
            value: IssuedApiKey {
                id: record.id,
                name: record.name,
                key: key.plain,
                key_prefix: record.key_prefix,
                created_at: record.created_at,
            },
            source: Source::Computed,
            rate,
        })
    }

    /// The caller's keys, revoked ones included. Never cached.
    pub async fn list_api_keys(
        &self,
        subject: &Subject,
        principal: &Principal,
    ) -> AppResult<Served<Vec<ApiKeyRecord>>> {
        let rate = self.limiter.check(subject, EndpointClass::Read).await?;
        let user_id = user_id_of(principal)?;
        let keys = self.db.api_keys().list_for_user(user_id).await?;
        Ok(Served {
            value: keys,
            source: Source::Computed,
            rate,
        })
    }

    pub async fn get_api_key(
        &self,
        subject: &Subject,
        principal: &Principal,
        id: i64,
    ) -> AppResult<Served<ApiKeyRecord>> {
        let rate = self.limiter.check(subject, EndpointClass::Read).await?;
        let user_id = user_id_of(principal)?;
        let record = self
            .db
            .api_keys()
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("API key"))?;
        if record.user_id != Some(user_id) {
            return Err(AppError::Forbidden("API key belongs to another user".into()));
        }
        Ok(Served {
            value: record,
            source: Source::Computed,
            rate,
        })
    }

    /// Deactivate one of the caller's keys. Revoked keys stop resolving at once.
    pub async fn revoke_api_key(
        &self,
        subject: &Subject,
        principal: &Principal,
        id: i64,
    ) -> AppResult<Served<()>> {
        let rate = self.limiter.check(subject, EndpointClass::Write).await?;
        let user_id = user_id_of(principal)?;

        let record = self
            .db
            .api_keys()
            .get_by_id(id)
            .await?
            .filter(|k| k.is_active)
            .ok_or_else(|| AppError::not_found("API key"))?;
        if record.user_id != Some(user_id) {
            return Err(AppError::Forbidden("API key belongs to another user".into()));
        }

        self.db.api_keys().deactivate(id).await?;
        tracing::info!(api_key_id = id, user_id, "API key revoked");
        Ok(Served {
            value: (),
            source: Source::Computed,
            rate,
        })
    }

    /// Map a presented `X-API-Key` to its rate-limit subject.
    pub async fn resolve_api_key(&self, key: &str) -> AppResult<Subject> {
        let key = key.trim();
        if self.admin_api_key.as_deref().is_some_and(|admin| admin == key) {
            return Ok(Subject::ApiKey("admin".to_string()));
        }

        let record = self
            .db
            .api_keys()
            .find_active(&hash_api_key(key))
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or inactive API key".into()))?;

        if let Err(e) = self.db.api_keys().mark_used(record.id).await {
            tracing::warn!(api_key_id = record.id, error = %e, "Failed to record API key use");
        }
        Ok(Subject::ApiKey(record.id.to_string()))
    }
}
