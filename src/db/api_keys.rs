//! API keys repository
//!
//! Only hashes are stored. Lookups go through the SHA-256 of the
//! presented key.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::now_iso8601;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub user_id: Option<i64>,
    pub is_active: bool,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateApiKey {
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub user_id: Option<i64>,
}

pub struct ApiKeysRepository {
    pool: SqlitePool,
}

impl ApiKeysRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, key: &CreateApiKey) -> Result<ApiKeyRecord> {
        let id = sqlx::query(
            r#"
            INSERT INTO api_keys (name, key_hash, key_prefix, user_id, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(key.user_id)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create API key"))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ApiKeyRecord>> {
        let record = sqlx::query_as::<_, ApiKeyRecord>("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Newest first, revoked keys included
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<ApiKeyRecord>> {
        let records = sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT * FROM api_keys WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Find an active key by hash
    pub async fn find_active(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let record = sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT * FROM api_keys WHERE key_hash = ? AND is_active = 1",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn mark_used(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(now_iso8601())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
