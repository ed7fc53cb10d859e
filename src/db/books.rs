//! Books repository
//!
//! Books carry many-to-many author and genre relations through
//! `book_authors` and `book_genres`.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::Pagination;
use super::authors::AuthorRecord;
use super::genres::GenreRecord;
use super::sqlite_helpers::{like_contains, now_iso8601};

const BOOK_COLUMNS: &str = "b.id, b.title, b.isbn, b.description, b.publication_date, \
     b.page_count, b.price, b.average_rating, b.review_count, b.created_at, b.updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<String>,
    pub page_count: Option<i64>,
    pub price: Option<f64>,
    pub average_rating: f64,
    pub review_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBook {
    pub title: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub author_ids: Vec<i64>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBook {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Replaces the author set when present
    #[serde(default)]
    pub author_ids: Option<Vec<i64>>,
    /// Replaces the genre set when present
    #[serde(default)]
    pub genre_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default)]
pub struct BookSearch {
    pub query: Option<String>,
    pub author_id: Option<i64>,
    pub genre_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct BookAuthorRow {
    book_id: i64,
    id: i64,
    name: String,
    bio: Option<String>,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct BookGenreRow {
    book_id: i64,
    #[sqlx(flatten)]
    genre: GenreRecord,
}

pub struct BookRepository {
    pool: SqlitePool,
}

impl BookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, page: Pagination) -> Result<(Vec<BookRecord>, i64)> {
        self.search(&BookSearch::default(), page).await
    }

    /// Filter by a case-insensitive term over title, description and ISBN,
    /// and optionally by author and genre.
    pub async fn search(
        &self,
        filter: &BookSearch,
        page: Pagination,
    ) -> Result<(Vec<BookRecord>, i64)> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT DISTINCT {} FROM books b", BOOK_COLUMNS));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY b.title, b.id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let books = qb.build_query_as::<BookRecord>().fetch_all(&self.pool).await?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(DISTINCT b.id) FROM books b");
        push_filters(&mut qb, filter);
        let total = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        Ok((books, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<BookRecord>> {
        let book = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books b WHERE b.id = ?",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    /// Authors for each of the given books, ordered by name
    pub async fn authors_for(
        &self,
        book_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<AuthorRecord>>> {
        let mut by_book: HashMap<i64, Vec<AuthorRecord>> = HashMap::new();
        if book_ids.is_empty() {
            return Ok(by_book);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ba.book_id, a.id, a.name, a.bio, a.created_at \
             FROM book_authors ba JOIN authors a ON a.id = ba.author_id \
             WHERE ba.book_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in book_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY a.name, a.id");

        let rows = qb.build_query_as::<BookAuthorRow>().fetch_all(&self.pool).await?;
        for row in rows {
            by_book.entry(row.book_id).or_default().push(AuthorRecord {
                id: row.id,
                name: row.name,
                bio: row.bio,
                created_at: row.created_at,
            });
        }
        Ok(by_book)
    }

    /// Genres for each of the given books, ordered by name
    pub async fn genres_for(&self, book_ids: &[i64]) -> Result<HashMap<i64, Vec<GenreRecord>>> {
        let mut by_book: HashMap<i64, Vec<GenreRecord>> = HashMap::new();
        if book_ids.is_empty() {
            return Ok(by_book);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT bg.book_id, g.id, g.name, g.description, g.created_at, g.updated_at \
             FROM book_genres bg JOIN genres g ON g.id = bg.genre_id \
             WHERE bg.book_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in book_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY g.name, g.id");

        let rows = qb.build_query_as::<BookGenreRow>().fetch_all(&self.pool).await?;
        for row in rows {
            by_book.entry(row.book_id).or_default().push(row.genre);
        }
        Ok(by_book)
    }

    pub async fn create(&self, book: &CreateBook) -> Result<BookRecord> {
        let now = now_iso8601();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO books
                (title, isbn, description, publication_date, page_count, price,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(book.title.trim())
        .bind(&book.isbn)
        .bind(&book.description)
        .bind(&book.publication_date)
        .bind(book.page_count)
        .bind(book.price)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        link(&mut tx, LINK_AUTHOR, id, &book.author_ids).await?;
        link(&mut tx, LINK_GENRE, id, &book.genre_ids).await?;

        tx.commit().await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create book"))
    }

    pub async fn update(&self, id: i64, update: &UpdateBook) -> Result<Option<BookRecord>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE books SET
                title = COALESCE(?, title),
                isbn = COALESCE(?, isbn),
                description = COALESCE(?, description),
                publication_date = COALESCE(?, publication_date),
                page_count = COALESCE(?, page_count),
                price = COALESCE(?, price),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.title.as_deref().map(str::trim))
        .bind(&update.isbn)
        .bind(&update.description)
        .bind(&update.publication_date)
        .bind(update.page_count)
        .bind(update.price)
        .bind(now_iso8601())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(author_ids) = &update.author_ids {
            sqlx::query("DELETE FROM book_authors WHERE book_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link(&mut tx, LINK_AUTHOR, id, author_ids).await?;
        }
        if let Some(genre_ids) = &update.genre_ids {
            sqlx::query("DELETE FROM book_genres WHERE book_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link(&mut tx, LINK_GENRE, id, genre_ids).await?;
        }

        tx.commit().await?;
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Author IDs linked to a book
    pub async fn author_ids(&self, book_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT author_id FROM book_authors WHERE book_id = ? ORDER BY author_id",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

const LINK_AUTHOR: &str = "INSERT OR IGNORE INTO book_authors (book_id, author_id) VALUES (?, ?)";
const LINK_GENRE: &str = "INSERT OR IGNORE INTO book_genres (book_id, genre_id) VALUES (?, ?)";

async fn link(conn: &mut SqliteConnection, sql: &str, book_id: i64, ids: &[i64]) -> Result<()> {
    for id in ids {
        sqlx::query(sql).bind(book_id).bind(id).execute(&mut *conn).await?;
    }
    Ok(())
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &BookSearch) {
    if let Some(author_id) = filter.author_id {
        qb.push(" JOIN book_authors ba ON ba.book_id = b.id AND ba.author_id = ")
            .push_bind(author_id);
    }
    if let Some(genre_id) = filter.genre_id {
        qb.push(" JOIN book_genres bg ON bg.book_id = b.id AND bg.genre_id = ")
            .push_bind(genre_id);
    }

    let term = filter
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| like_contains(&q.to_lowercase()));

    if let Some(pattern) = term {
        qb.push(" WHERE (lower(b.title) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(COALESCE(b.description, '')) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(COALESCE(b.isbn, '')) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateAuthor, CreateGenre, Database};
    use pretty_assertions::assert_eq;

    async fn seeded() -> (Database, i64) {
        let db = Database::connect_in_memory().await.unwrap();
        let author = db
            .authors()
            .create(&CreateAuthor {
                name: "Frank Herbert".into(),
                bio: None,
            })
            .await
            .unwrap();

        for (title, authored) in [("Dune", true), ("Dune Messiah", true), ("Neuromancer", false)] {
            db.books()
                .create(&CreateBook {
                    title: title.into(),
                    author_ids: if authored { vec![author.id] } else { vec![] },
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        (db, author.id)
    }

    #[tokio::test]
    async fn test_search_by_term_and_author() {
        let (db, author_id) = seeded().await;
        let books = db.books();
        let page = Pagination::default();

        let by_term = BookSearch {
            query: Some("DUNE".into()),
            ..Default::default()
        };
        let (found, total) = books.search(&by_term, page).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(
            found.iter().map(|b| b.title.as_str()).collect::<Vec<_>>(),
            vec!["Dune", "Dune Messiah"]
        );

        let by_author = BookSearch {
            author_id: Some(author_id),
            ..Default::default()
        };
        let (_, total) = books.search(&by_author, page).await.unwrap();
        assert_eq!(total, 2);

        let (_, total) = books.list(page).await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_update_replaces_authors_and_keeps_absent_fields() {
        let (db, _) = seeded().await;
        let books = db.books();
        let (all, _) = books.list(Pagination::default()).await.unwrap();
        let dune = all.iter().find(|b| b.title == "Dune").unwrap();

        let updated = books
            .update(
                dune.id,
                &UpdateBook {
                    page_count: Some(412),
                    author_ids: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "Dune");
        assert_eq!(updated.page_count, Some(412));
        assert!(books.author_ids(dune.id).await.unwrap().is_empty());

        let authors = books.authors_for(&[dune.id]).await.unwrap();
        assert!(authors.get(&dune.id).is_none());
    }

    #[tokio::test]
    async fn test_genre_links_and_filter() {
        let (db, _) = seeded().await;
        let genre = db
            .genres()
            .create(&CreateGenre {
                name: "Science Fiction".into(),
                description: None,
            })
            .await
            .unwrap();
        let books = db.books();
        let novel = books
            .create(&CreateBook {
                title: "Hyperion".into(),
                genre_ids: vec![genre.id, genre.id],
                ..Default::default()
            })
            .await
            .unwrap();

        let genres = books.genres_for(&[novel.id]).await.unwrap();
        assert_eq!(genres[&novel.id], vec![genre.clone()]);

        let by_genre = BookSearch {
            genre_id: Some(genre.id),
            ..Default::default()
        };
        let (found, total) = books.search(&by_genre, Pagination::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, novel.id);

        let cleared = UpdateBook {
            genre_ids: Some(vec![]),
            ..Default::default()
        };
        books.update(novel.id, &cleared).await.unwrap().unwrap();
        let (_, total) = books.search(&by_genre, Pagination::default()).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_book() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(db.books().update(99, &UpdateBook::default()).await.unwrap().is_none());
        assert!(!db.books().delete(99).await.unwrap());
    }
}
