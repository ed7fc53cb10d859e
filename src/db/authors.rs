//! Authors repository

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::Pagination;
use super::sqlite_helpers::now_iso8601;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorRecord {
    pub id: i64,
    pub name: String,
    pub bio: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuthor {
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

pub struct AuthorRepository {
    pool: SqlitePool,
}

impl AuthorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List authors by name, with the total count
    pub async fn list(&self, page: Pagination) -> Result<(Vec<AuthorRecord>, i64)> {
        let authors = sqlx::query_as::<_, AuthorRecord>(
            "SELECT id, name, bio, created_at FROM authors ORDER BY name, id LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
            .fetch_one(&self.pool)
            .await?;

        Ok((authors, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<AuthorRecord>> {
        let author = sqlx::query_as::<_, AuthorRecord>(
            "SELECT id, name, bio, created_at FROM authors WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(author)
    }

    pub async fn create(&self, author: &CreateAuthor) -> Result<AuthorRecord> {
        let id = sqlx::query("INSERT INTO authors (name, bio, created_at) VALUES (?, ?, ?)")
            .bind(author.name.trim())
            .bind(&author.bio)
            .bind(now_iso8601())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create author"))
    }

    pub async fn update(&self, id: i64, update: &UpdateAuthor) -> Result<Option<AuthorRecord>> {
        let result = sqlx::query(
            "UPDATE authors SET name = COALESCE(?, name), bio = COALESCE(?, bio) WHERE id = ?",
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.bio)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM authors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// IDs from `ids` with no matching author
    pub async fn missing(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM authors WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let found: Vec<i64> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        let mut missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !found.contains(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        Ok(missing)
    }
}
