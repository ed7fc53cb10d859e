//! Users repository for authentication

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::now_iso8601;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

pub struct UsersRepository {
    pool: SqlitePool,
}

impl UsersRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, user: &CreateUser) -> Result<UserRecord> {
        let id = sqlx::query(
            r#"
            INSERT INTO users (email, username, password_hash, is_active, created_at)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(user.email.trim())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, username, password_hash, is_active, created_at \
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Get user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, username, password_hash, is_active, created_at \
             FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
