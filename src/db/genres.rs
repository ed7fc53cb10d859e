//! Genres repository
//!
//! Genre names are unique, compared case-insensitively.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::Pagination;
use super::sqlite_helpers::now_iso8601;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GenreRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGenre {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGenre {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub struct GenreRepository {
    pool: SqlitePool,
}

impl GenreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, page: Pagination) -> Result<(Vec<GenreRecord>, i64)> {
        let genres = sqlx::query_as::<_, GenreRecord>(
            "SELECT id, name, description, created_at, updated_at FROM genres \
             ORDER BY name, id LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM genres")
            .fetch_one(&self.pool)
            .await?;

        Ok((genres, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<GenreRecord>> {
        let genre = sqlx::query_as::<_, GenreRecord>(
            "SELECT id, name, description, created_at, updated_at FROM genres WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(genre)
    }

    pub async fn create(&self, genre: &CreateGenre) -> Result<GenreRecord> {
        let now = now_iso8601();
        let id = sqlx::query(
            "INSERT INTO genres (name, description, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(genre.name.trim())
        .bind(&genre.description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create genre"))
    }

    pub async fn update(&self, id: i64, update: &UpdateGenre) -> Result<Option<GenreRecord>> {
        let result = sqlx::query(
            r#"
            UPDATE genres SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(now_iso8601())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM genres WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// IDs from `ids` with no matching genre
    pub async fn missing(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM genres WHERE id IN (");
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
