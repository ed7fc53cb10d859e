//! Review reads and writes
//!
//! Review events go to `reviews`, `book:{id}` and the author's `user:{id}`.

use super::{Catalog, snapshot, user_id_of};
use crate::admission::{CacheKey, EndpointClass, Invalidation, Served, Subject};
use crate::auth::Principal;
use crate::broadcast::{Action, DomainEvent};
use crate::db::{
    CreateReview, Paginated, Pagination, ReviewRecord, UpdateReview, is_unique_violation,
};
use crate::error::{AppError, AppResult};

const ALREADY_REVIEWED: &str = "You have already reviewed this book";

fn validate_rating(rating: Option<i64>) -> AppResult<()> {
    if rating.is_some_and(|r| !(1..=5).contains(&r)) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }
    Ok(())
}

impl Catalog {
    pub async fn list_reviews(
        &self,
        subject: &Subject,
        book_id: i64,
        page: Pagination,
    ) -> AppResult<Served<Paginated<ReviewRecord>>> {
        let key = CacheKey::book_reviews(book_id, page.page, page.per_page);
        self.admission
            .read_through(subject, EndpointClass::Read, &key, || async {
                if self.db.books().get_by_id(book_id).await?.is_none() {
                    return Err(AppError::not_found("Book"));
                }
                let (reviews, total) = self.db.reviews().list_for_book(book_id, page).await?;
                Ok(Paginated::new(reviews, total, page))
            })
            .await
    }

    pub async fn get_review(&self, subject: &Subject, id: i64) -> AppResult<Served<ReviewRecord>> {
        self.admission
            .read_through(subject, EndpointClass::Read, &CacheKey::review(id), || async {
                self.db
                    .reviews()
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Review"))
            })
            .await
    }

    /// One review per user and book.
    pub async fn create_review(
        &self,
        subject: &Subject,
        principal: &Principal,
        book_id: i64,
        input: CreateReview,
    ) -> AppResult<Served<ReviewRecord>> {
        let author_id = user_id_of(principal)?;

        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_rating(Some(input.rating))?;
                    if self.db.books().get_by_id(book_id).await?.is_none() {
                        return Err(AppError::not_found("Book"));
                    }
                    let reviews = self.db.reviews();
                    if reviews.find_for_user(book_id, author_id).await?.is_some() {
                        return Err(AppError::Conflict(ALREADY_REVIEWED.into()));
                    }
                    reviews.create(book_id, author_id, &input).await.map_err(|e| {
                        if is_unique_violation(&e) {
                            AppError::Conflict(ALREADY_REVIEWED.into())
                        } else {
                            AppError::Internal(e)
                        }
                    })
                },
                |review: &ReviewRecord| {
                    vec![Invalidation::Review {
                        book_id,
                        id: Some(review.id),
                    }]
                },
            )
            .await?;

        let review = &served.value;
        tracing::info!(review_id = review.id, book_id, "Review created");
        self.publish(DomainEvent::review(
            Action::Created,
            book_id,
            review.id,
            Some(author_id),
            snapshot(review),
        ));
        Ok(served)
    }

    /// Only the review's author may edit it. A changed rating recomputes the
    /// book's average.
    pub async fn update_review(
        &self,
        subject: &Subject,
        principal: &Principal,
        review_id: i64,
        input: UpdateReview,
    ) -> AppResult<Served<ReviewRecord>> {
        let caller = user_id_of(principal)?;

        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_rating(input.rating)?;
                    let reviews = self.db.reviews();
                    let review = reviews
                        .get_by_id(review_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Review"))?;
                    if review.user_id != caller {
                        return Err(AppError::Forbidden("Not the author of this review".into()));
                    }
                    reviews
                        .update(review_id, &input)
                        .await?
                        .ok_or_else(|| AppError::not_found("Review"))
                },
                |review: &ReviewRecord| {
                    vec![Invalidation::Review {
                        book_id: review.book_id,
                        id: Some(review.id),
                    }]
                },
            )
            .await?;

        let review = &served.value;
        tracing::info!(review_id, book_id = review.book_id, "Review updated");
        self.publish(DomainEvent::review(
            Action::Updated,
            review.book_id,
            review.id,
            Some(review.user_id),
            snapshot(review),
        ));
        Ok(served)
    }

    /// Only the review's author may delete it.
    pub async fn delete_review(
        &self,
        subject: &Subject,
        principal: &Principal,
        review_id: i64,
    ) -> AppResult<Served<ReviewRecord>> {
        let caller = user_id_of(principal)?;

        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    let review = self
                        .db
                        .reviews()
                        .get_by_id(review_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Review"))?;
                    if review.user_id != caller {
                        return Err(AppError::Forbidden("Not the author of this review".into()));
                    }
                    self.db
                        .reviews()
                        .delete(review_id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Review"))
                },
                |review: &ReviewRecord| {
                    vec![Invalidation::Review {
                        book_id: review.book_id,
                        id: Some(review.id),
                    }]
                },
            )
            .await?;

        let review = &served.value;
        tracing::info!(review_id, book_id = review.book_id, "Review deleted");
        self.publish(DomainEvent::review(
            Action::Deleted,
            review.book_id,
            review.id,
            Some(review.user_id),
            snapshot(review),
        ));
        Ok(served)
    }
}
