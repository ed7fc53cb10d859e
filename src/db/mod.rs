//! Database connection and operations

pub mod api_keys;
pub mod authors;
pub mod books;
pub mod genres;
pub mod reviews;
pub mod schema;
pub mod sqlite_helpers;
pub mod users;

use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use api_keys::{ApiKeyRecord, ApiKeysRepository, CreateApiKey};
pub use authors::{AuthorRecord, AuthorRepository, CreateAuthor, UpdateAuthor};
pub use books::{BookRecord, BookRepository, BookSearch, CreateBook, UpdateBook};
pub use genres::{CreateGenre, GenreRecord, GenreRepository, UpdateGenre};
pub use reviews::{CreateReview, ReviewRecord, ReviewRepository, UpdateReview};
pub use users::{CreateUser, UserRecord, UsersRepository};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: Pagination) -> Self {
        let per_page = i64::from(page.per_page);
        Self {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
            pages: (total + per_page - 1) / per_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            pages: self.pages,
        }
    }
}

/// True when the error chain holds a UNIQUE constraint failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid DATABASE_URL: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database with schema applied.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.pool).await
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a books repository
    pub fn books(&self) -> BookRepository {
        BookRepository::new(self.pool.clone())
    }

    /// Get an authors repository
    pub fn authors(&self) -> AuthorRepository {
        AuthorRepository::new(self.pool.clone())
    }

    /// Get a genres repository
    pub fn genres(&self) -> GenreRepository {
        GenreRepository::new(self.pool.clone())
    }

    /// Get a reviews repository
    pub fn reviews(&self) -> ReviewRepository {
        ReviewRepository::new(self.pool.clone())
    }

    /// Get a users repository
    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get an API keys repository
    pub fn api_keys(&self) -> ApiKeysRepository {
        ApiKeysRepository::new(self.pool.clone())
    }
}
