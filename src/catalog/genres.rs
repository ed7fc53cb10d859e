//! Genre reads and writes

use super::Catalog;
use super::books::Book;
use crate::admission::{CacheKey, EndpointClass, Invalidation, Served, Subject};
use crate::db::{
    BookSearch, CreateGenre, GenreRecord, Paginated, Pagination, UpdateGenre, is_unique_violation,
};
use crate::error::{AppError, AppResult};

fn validate_name(name: Option<&str>) -> AppResult<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    Ok(())
}

fn duplicate_name(err: anyhow::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict("A genre with this name already exists".into())
    } else {
        AppError::Internal(err)
    }
}

impl Catalog {
    pub async fn list_genres(
        &self,
        subject: &Subject,
        page: Pagination,
    ) -> AppResult<Served<Paginated<GenreRecord>>> {
        let key = CacheKey::genres(page.page, page.per_page);
        self.admission
            .read_through(subject, EndpointClass::Read, &key, || async {
                let (genres, total) = self.db.genres().list(page).await?;
                Ok(Paginated::new(genres, total, page))
            })
            .await
    }

    pub async fn get_genre(&self, subject: &Subject, id: i64) -> AppResult<Served<GenreRecord>> {
        self.admission
            .read_through(subject, EndpointClass::Read, &CacheKey::genre(id), || async {
                self.db
                    .genres()
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Genre"))
            })
            .await
    }

    pub async fn genre_books(
        &self,
        subject: &Subject,
        genre_id: i64,
        page: Pagination,
    ) -> AppResult<Served<Paginated<Book>>> {
        let key = CacheKey::genre_books(genre_id, page.page, page.per_page);
        let filter = BookSearch {
            genre_id: Some(genre_id),
            ..Default::default()
        };
        self.admission
            .read_through(subject, EndpointClass::Read, &key, || async {
                if self.db.genres().get_by_id(genre_id).await?.is_none() {
                    return Err(AppError::not_found("Genre"));
                }
                self.filtered_books(&filter, page).await
            })
            .await
    }

    pub async fn create_genre(
        &self,
        subject: &Subject,
        input: CreateGenre,
    ) -> AppResult<Served<GenreRecord>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_name(Some(input.name.as_str()))?;
                    self.db.genres().create(&input).await.map_err(duplicate_name)
                },
                |genre: &GenreRecord| vec![Invalidation::Genre { id: Some(genre.id) }],
            )
            .await?;

        tracing::info!(genre_id = served.value.id, name = %served.value.name, "Genre created");
        Ok(served)
    }

    pub async fn update_genre(
        &self,
        subject: &Subject,
        id: i64,
        input: UpdateGenre,
    ) -> AppResult<Served<GenreRecord>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_name(input.name.as_deref())?;
                    self.db
                        .genres()
                        .update(id, &input)
                        .await
                        .map_err(duplicate_name)?
                        .ok_or_else(|| AppError::not_found("Genre"))
                },
                |_| vec![Invalidation::Genre { id: Some(id) }],
            )
            .await?;

        tracing::info!(genre_id = id, "Genre updated");
        Ok(served)
    }

    /// Books keep existing; only the link rows go.
    pub async fn delete_genre(&self, subject: &Subject, id: i64) -> AppResult<Served<()>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    if self.db.genres().delete(id).await? {
                        Ok(())
                    } else {
                        Err(AppError::not_found("Genre"))
                    }
                },
                |_| vec![Invalidation::Genre { id: Some(id) }],
            )
            .await?;

        tracing::info!(genre_id = id, "Genre deleted");
        Ok(served)
    }
}
