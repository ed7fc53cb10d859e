//! Author reads and writes

use super::Catalog;
use crate::admission::{CacheKey, EndpointClass, Invalidation, Served, Subject};
use crate::db::{AuthorRecord, CreateAuthor, Paginated, Pagination, UpdateAuthor};
use crate::error::{AppError, AppResult};

fn validate_name(name: Option<&str>) -> AppResult<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    Ok(())
}

impl Catalog {
    pub async fn list_authors(
        &self,
        subject: &Subject,
        page: Pagination,
    ) -> AppResult<Served<Paginated<AuthorRecord>>> {
        let key = CacheKey::authors(page.page, page.per_page);
        self.admission
            .read_through(subject, EndpointClass::Read, &key, || async {
                let (authors, total) = self.db.authors().list(page).await?;
                Ok(Paginated::new(authors, total, page))
            })
            .await
    }

    pub async fn get_author(&self, subject: &Subject, id: i64) -> AppResult<Served<AuthorRecord>> {
        self.admission
            .read_through(subject, EndpointClass::Read, &CacheKey::author(id), || async {
                self.db
                    .authors()
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Author"))
            })
            .await
    }

    pub async fn create_author(
        &self,
        subject: &Subject,
        input: CreateAuthor,
    ) -> AppResult<Served<AuthorRecord>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_name(Some(input.name.as_str()))?;
                    Ok::<_, AppError>(self.db.authors().create(&input).await?)
                },
                |author: &AuthorRecord| vec![Invalidation::Author { id: Some(author.id) }],
            )
            .await?;

        tracing::info!(author_id = served.value.id, "Author created");
        Ok(served)
    }

    pub async fn update_author(
        &self,
        subject: &Subject,
        id: i64,
        input: UpdateAuthor,
    ) -> AppResult<Served<AuthorRecord>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_name(input.name.as_deref())?;
                    self.db
                        .authors()
                        .update(id, &input)
                        .await?
                        .ok_or_else(|| AppError::not_found("Author"))
                },
                |_| vec![Invalidation::Author { id: Some(id) }],
            )
            .await?;

        tracing::info!(author_id = id, "Author updated");
        Ok(served)
    }

    /// Books keep existing; only the link rows go.
    pub async fn delete_author(&self, subject: &Subject, id: i64) -> AppResult<Served<()>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    if self.db.authors().delete(id).await? {
                        Ok(())
                    } else {
                        Err(AppError::not_found("Author"))
                    }
                },
                |_| vec![Invalidation::Author { id: Some(id) }],
            )
            .await?;

        tracing::info!(author_id = id, "Author deleted");
        Ok(served)
    }
}
