//! Reviews repository
//!
//! Each user reviews a book at most once. Creating, updating or deleting
//! a review recomputes the book's `average_rating`
//! and `review_count` in the same transaction.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use super::Pagination;
use super::sqlite_helpers::now_iso8601;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewRecord {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReview {
    pub rating: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReview {
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

const REVIEW_COLUMNS: &str =
    "id, book_id, user_id, rating, title, content, created_at, updated_at";

pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Newest first
    pub async fn list_for_book(
        &self,
        book_id: i64,
        page: Pagination,
    ) -> Result<(Vec<ReviewRecord>, i64)> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE book_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let reviews = sqlx::query_as::<_, ReviewRecord>(&sql)
            .bind(book_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE book_id = ?")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((reviews, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ReviewRecord>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?");
        let review = sqlx::query_as::<_, ReviewRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(review)
    }

    pub async fn find_for_user(
        &self,
        book_id: i64,
        user_id: i64,
    ) -> Result<Option<ReviewRecord>> {
        let sql =
            format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE book_id = ? AND user_id = ?");
        let review = sqlx::query_as::<_, ReviewRecord>(&sql)
            .bind(book_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(review)
    }

    pub async fn create(
        &self,
        book_id: i64,
        user_id: i64,
        review: &CreateReview,
    ) -> Result<ReviewRecord> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO reviews (book_id, user_id, rating, title, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .bind(review.rating)
        .bind(&review.title)
        .bind(&review.content)
        .bind(now_iso8601())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        recompute_rating(&mut tx, book_id).await?;
        tx.commit().await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create review"))
    }

    pub async fn update(&self, id: i64, update: &UpdateReview) -> Result<Option<ReviewRecord>> {
        let Some(existing) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE reviews SET
                rating = COALESCE(?, rating),
                title = COALESCE(?, title),
                content = COALESCE(?, content),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.rating)
        .bind(&update.title)
        .bind(&update.content)
        .bind(now_iso8601())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if update.rating.is_some_and(|rating| rating != existing.rating) {
            recompute_rating(&mut tx, existing.book_id).await?;
        }
        tx.commit().await?;

        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<Option<ReviewRecord>> {
        let Some(review) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        recompute_rating(&mut tx, review.book_id).await?;
        tx.commit().await?;

        Ok(Some(review))
    }
}

async fn recompute_rating(conn: &mut SqliteConnection, book_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE books SET
            average_rating = COALESCE(
                (SELECT ROUND(AVG(rating), 2) FROM reviews WHERE book_id = ?1),
                0
            ),
            review_count = (SELECT COUNT(*) FROM reviews WHERE book_id = ?1),
            updated_at = ?2
        WHERE id = ?1
        "#,
    )
    .bind(book_id)
    .bind(now_iso8601())
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BookRecord, CreateBook, CreateUser, Database, UserRecord, is_unique_violation};

    async fn book(db: &Database) -> BookRecord {
        db.books()
            .create(&CreateBook {
                title: "Dune".into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn user(db: &Database, email: &str) -> UserRecord {
        db.users()
            .create(&CreateUser {
                email: email.into(),
                username: "r".into(),
                password_hash: "x".into(),
            })
            .await
            .unwrap()
    }

    fn review(rating: i64) -> CreateReview {
        CreateReview {
            rating,
            title: None,
            content: None,
        }
    }

    #[tokio::test]
    async fn test_rating_follows_reviews() {
        let db = Database::connect_in_memory().await.unwrap();
        let book = book(&db).await;
        let alice = user(&db, "alice@example.com").await;
        let bob = user(&db, "bob@example.com").await;

        let reviews = db.reviews();
        let first = reviews.create(book.id, alice.id, &review(5)).await.unwrap();
        let second = reviews.create(book.id, bob.id, &review(2)).await.unwrap();

        let book_now = db.books().get_by_id(book.id).await.unwrap().unwrap();
        assert_eq!(book_now.review_count, 2);
        assert!((book_now.average_rating - 3.5).abs() < f64::EPSILON);

        let updated = reviews
            .update(
                second.id,
                &UpdateReview {
                    rating: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.rating, 4);
        assert!(updated.updated_at.is_some());
        let book_now = db.books().get_by_id(book.id).await.unwrap().unwrap();
        assert!((book_now.average_rating - 4.5).abs() < f64::EPSILON);

        let deleted = reviews.delete(first.id).await.unwrap().unwrap();
        assert_eq!(deleted.rating, 5);
        let book_now = db.books().get_by_id(book.id).await.unwrap().unwrap();
        assert_eq!(book_now.review_count, 1);
        assert!((book_now.average_rating - 4.0).abs() < f64::EPSILON);

        assert!(reviews.delete(first.id).await.unwrap().is_none());
        assert!(reviews.update(first.id, &UpdateReview::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_review_by_same_user_is_rejected() {
        let db = Database::connect_in_memory().await.unwrap();
        let book = book(&db).await;
        let alice = user(&db, "alice@example.com").await;

        let reviews = db.reviews();
        let first = reviews.create(book.id, alice.id, &review(5)).await.unwrap();
        let err = reviews.create(book.id, alice.id, &review(1)).await.unwrap_err();
        assert!(is_unique_violation(&err));

        let found = reviews.find_for_user(book.id, alice.id).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(first.id));
        let book_now = db.books().get_by_id(book.id).await.unwrap().unwrap();
        assert_eq!(book_now.review_count, 1);
    }

    #[tokio::test]
    async fn test_rating_out_of_range_is_rejected() {
        let db = Database::connect_in_memory().await.unwrap();
        let book = book(&db).await;
        let alice = user(&db, "alice@example.com").await;

        assert!(db.reviews().create(book.id, alice.id, &review(9)).await.is_err());
    }
}
