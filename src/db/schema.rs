//! Schema bootstrap
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` at startup, so
//! running against an existing database is a no-op.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        bio TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        isbn TEXT UNIQUE,
        description TEXT,
        publication_date TEXT,
        page_count INTEGER,
        price REAL,
        average_rating REAL NOT NULL DEFAULT 0,
        review_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS book_authors (
        book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
        PRIMARY KEY (book_id, author_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS genres (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        description TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS book_genres (
        book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        genre_id INTEGER NOT NULL REFERENCES genres(id) ON DELETE CASCADE,
        PRIMARY KEY (book_id, genre_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE COLLATE NOCASE,
        username TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        title TEXT,
        content TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        key_hash TEXT NOT NULL UNIQUE,
        key_prefix TEXT NOT NULL,
        user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        last_used_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_books_title ON books(title)",
    "CREATE INDEX IF NOT EXISTS idx_book_authors_author ON book_authors(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_book_genres_genre ON book_genres(genre_id)",
    "CREATE INDEX IF NOT EXISTS idx_reviews_book ON reviews(book_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_reviews_book_user ON reviews(book_id, user_id)",
];

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to apply schema statement: {}", statement.trim()))?;
    }
    tx.commit().await?;
    Ok(())
}
