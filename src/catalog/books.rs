//! Book reads and writes

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Catalog, snapshot};
use crate::admission::{CacheKey, EndpointClass, Invalidation, Served, Subject};
use crate::broadcast::{Action, DomainEvent};
use crate::db::{
    AuthorRecord, BookRecord, BookSearch, CreateBook, GenreRecord, Paginated, Pagination,
    UpdateBook, is_unique_violation,
};
use crate::error::{AppError, AppResult};

/// A book with its authors and genres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<String>,
    pub page_count: Option<i64>,
    pub price: Option<f64>,
    pub average_rating: f64,
    pub review_count: i64,
    pub authors: Vec<AuthorRecord>,
    pub genres: Vec<GenreRecord>,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    fn from_record(
        record: BookRecord,
        authors: Vec<AuthorRecord>,
        genres: Vec<GenreRecord>,
    ) -> Self {
        Self {
            id: record.id,
            title: record.title,
            isbn: record.isbn,
            description: record.description,
            publication_date: record.publication_date,
            page_count: record.page_count,
            price: record.price,
            average_rating: record.average_rating,
            review_count: record.review_count,
            authors,
            genres,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn validate_fields(
    title: Option<&str>,
    page_count: Option<i64>,
    price: Option<f64>,
) -> AppResult<()> {
    if title.is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }
    if page_count.is_some_and(|n| n <= 0) {
        return Err(AppError::BadRequest("page_count must be positive".into()));
    }
    if price.is_some_and(|p| p < 0.0) {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    Ok(())
}

impl Catalog {
    async fn with_relations(
        &self,
        (records, total): (Vec<BookRecord>, i64),
        page: Pagination,
    ) -> AppResult<Paginated<Book>> {
        let ids: Vec<i64> = records.iter().map(|b| b.id).collect();
        let repo = self.db.books();
        let mut authors = repo.authors_for(&ids).await?;
        let mut genres = repo.genres_for(&ids).await?;
        let books = records
            .into_iter()
            .map(|record| {
                let linked_authors = authors.remove(&record.id).unwrap_or_default();
                let linked_genres = genres.remove(&record.id).unwrap_or_default();
                Book::from_record(record, linked_authors, linked_genres)
            })
            .collect();
        Ok(Paginated::new(books, total, page))
    }

    pub(super) async fn filtered_books(
        &self,
        filter: &BookSearch,
        page: Pagination,
    ) -> AppResult<Paginated<Book>> {
        let rows = self.db.books().search(filter, page).await?;
        self.with_relations(rows, page).await
    }

    async fn load_book(&self, id: i64) -> AppResult<Option<Book>> {
        let repo = self.db.books();
        let Some(record) = repo.get_by_id(id).await? else {
            return Ok(None);
        };
        let authors = repo.authors_for(&[id]).await?.remove(&id).unwrap_or_default();
        let genres = repo.genres_for(&[id]).await?.remove(&id).unwrap_or_default();
        Ok(Some(Book::from_record(record, authors, genres)))
    }

    async fn check_authors(&self, ids: &[i64]) -> AppResult<()> {
        let missing = self.db.authors().missing(ids).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::BadRequest(format!("Unknown author ids: {:?}", missing)))
        }
    }

    async fn check_genres(&self, ids: &[i64]) -> AppResult<()> {
        let missing = self.db.genres().missing(ids).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::BadRequest(format!("Unknown genre ids: {:?}", missing)))
        }
    }

    pub async fn list_books(
        &self,
        subject: &Subject,
        page: Pagination,
    ) -> AppResult<Served<Paginated<Book>>> {
        let key = CacheKey::books(page.page, page.per_page);
        self.admission
            .read_through(subject, EndpointClass::Read, &key, || async {
                let rows = self.db.books().list(page).await?;
                self.with_relations(rows, page).await
            })
            .await
    }

    pub async fn search_books(
        &self,
        subject: &Subject,
        filter: BookSearch,
        page: Pagination,
    ) -> AppResult<Served<Paginated<Book>>> {
        let key = CacheKey::search(
            filter.query.as_deref(),
            filter.author_id,
            filter.genre_id,
            page.page,
            page.per_page,
        );
        self.admission
            .read_through(subject, EndpointClass::Search, &key, || async {
                self.filtered_books(&filter, page).await
            })
            .await
    }

    pub async fn author_books(
        &self,
        subject: &Subject,
        author_id: i64,
        page: Pagination,
    ) -> AppResult<Served<Paginated<Book>>> {
        let key = CacheKey::author_books(author_id, page.page, page.per_page);
        let filter = BookSearch {
            author_id: Some(author_id),
            ..Default::default()
        };
        self.admission
            .read_through(subject, EndpointClass::Read, &key, || async {
                if self.db.authors().get_by_id(author_id).await?.is_none() {
                    return Err(AppError::not_found("Author"));
                }
                self.filtered_books(&filter, page).await
            })
            .await
    }

    pub async fn get_book(&self, subject: &Subject, id: i64) -> AppResult<Served<Book>> {
        self.admission
            .read_through(subject, EndpointClass::Read, &CacheKey::book(id), || async {
                self.load_book(id).await?.ok_or_else(|| AppError::not_found("Book"))
            })
            .await
    }

    pub async fn create_book(
        &self,
        subject: &Subject,
        input: CreateBook,
    ) -> AppResult<Served<Book>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_fields(Some(input.title.as_str()), input.page_count, input.price)?;
                    self.check_authors(&input.author_ids).await?;
                    self.check_genres(&input.genre_ids).await?;
                    let record = self.db.books().create(&input).await.map_err(|e| {
                        if is_unique_violation(&e) {
                            AppError::Conflict("A book with this ISBN already exists".into())
                        } else {
                            AppError::Internal(e)
                        }
                    })?;
                    self.load_book(record.id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Book"))
                },
                |book: &Book| vec![Invalidation::Book { id: Some(book.id) }],
            )
            .await?;

        let book = &served.value;
        tracing::info!(book_id = book.id, title = %book.title, "Book created");
        self.publish(DomainEvent::book(Action::Created, book.id, snapshot(book)));
        Ok(served)
    }

    pub async fn update_book(
        &self,
        subject: &Subject,
        id: i64,
        input: UpdateBook,
    ) -> AppResult<Served<Book>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    validate_fields(input.title.as_deref(), input.page_count, input.price)?;
                    if let Some(author_ids) = &input.author_ids {
                        self.check_authors(author_ids).await?;
                    }
                    if let Some(genre_ids) = &input.genre_ids {
                        self.check_genres(genre_ids).await?;
                    }
                    let updated = self.db.books().update(id, &input).await.map_err(|e| {
                        if is_unique_violation(&e) {
                            AppError::Conflict("A book with this ISBN already exists".into())
                        } else {
                            AppError::Internal(e)
                        }
                    })?;
                    if updated.is_none() {
                        return Err(AppError::not_found("Book"));
                    }
                    self.load_book(id).await?.ok_or_else(|| AppError::not_found("Book"))
                },
                |book: &Book| vec![Invalidation::Book { id: Some(book.id) }],
            )
            .await?;

        tracing::info!(book_id = id, "Book updated");
        self.publish(DomainEvent::book(Action::Updated, id, snapshot(&served.value)));
        Ok(served)
    }

    pub async fn delete_book(&self, subject: &Subject, id: i64) -> AppResult<Served<()>> {
        let served = self
            .admission
            .write_through(
                subject,
                || async {
                    if self.db.books().delete(id).await? {
                        Ok(())
                    } else {
                        Err(AppError::not_found("Book"))
                    }
                },
                |_| {
                    vec![
                        Invalidation::Book { id: Some(id) },
                        Invalidation::Review {
                            book_id: id,
                            id: None,
                        },
                    ]
                },
            )
            .await?;

        tracing::info!(book_id = id, "Book deleted");
        self.publish(DomainEvent::book(Action::Deleted, id, json!({ "id": id })));
        Ok(served)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{RateLimitPolicy, Source, TierLimits};
    use crate::broadcast::{Channel, Outbound};
    use crate::catalog::test_support::{catalog, catalog_with};
    use crate::config::Config;
    use crate::db::{CreateAuthor, CreateGenre};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn anon() -> Subject {
        Subject::Ip("10.0.0.1".into())
    }

    fn dune() -> CreateBook {
        CreateBook {
            title: "Dune".into(),
            isbn: Some("9780441013593".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_is_cached_until_write() {
        let catalog = catalog().await;
        let created = catalog.create_book(&anon(), dune()).await.unwrap().value;

        let first = catalog.get_book(&anon(), created.id).await.unwrap();
        assert_eq!(first.source, Source::Computed);
        let second = catalog.get_book(&anon(), created.id).await.unwrap();
        assert_eq!(second.source, Source::Cache);

        catalog
            .update_book(
                &anon(),
                created.id,
                UpdateBook {
                    title: Some("Dune (Deluxe)".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let third = catalog.get_book(&anon(), created.id).await.unwrap();
        assert_eq!(third.source, Source::Computed);
        assert_eq!(third.value.title, "Dune (Deluxe)");
    }

    #[tokio::test]
    async fn test_listing_invalidated_by_create() {
        let catalog = catalog().await;
        let page = Pagination::default();
        assert_eq!(catalog.list_books(&anon(), page).await.unwrap().value.total, 0);

        catalog.create_book(&anon(), dune()).await.unwrap();
        let listing = catalog.list_books(&anon(), page).await.unwrap();
        assert_eq!(listing.source, Source::Computed);
        assert_eq!(listing.value.total, 1);
    }

    #[tokio::test]
    async fn test_missing_book_is_not_found_and_not_cached() {
        let catalog = catalog().await;
        assert_matches!(catalog.get_book(&anon(), 404).await, Err(AppError::NotFound(_)));
        assert_eq!(catalog.admission().cache().len().await, Some(0));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let catalog = catalog().await;
        let blank = CreateBook {
            title: "  ".into(),
            ..Default::default()
        };
        assert_matches!(catalog.create_book(&anon(), blank).await, Err(AppError::BadRequest(_)));

        let unknown_author = CreateBook {
            author_ids: vec![77],
            ..dune()
        };
        assert_matches!(
            catalog.create_book(&anon(), unknown_author).await,
            Err(AppError::BadRequest(_))
        );

        catalog.create_book(&anon(), dune()).await.unwrap();
        assert_matches!(catalog.create_book(&anon(), dune()).await, Err(AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_writes_publish_to_book_channels() {
        let catalog = catalog().await;
        let mut watcher = catalog.hub().register(None);
        catalog
            .hub()
            .subscribe(watcher.id, &Channel::collection("books"))
            .unwrap();

        let book = catalog.create_book(&anon(), dune()).await.unwrap().value;
        catalog.delete_book(&anon(), book.id).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(Outbound::Message(text)) = watcher.receiver.try_recv() {
            let json: serde_json::Value = serde_json::from_str(&text).unwrap();
            kinds.push(json["type"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(kinds, vec!["book.created", "book.deleted"]);
    }

    #[tokio::test]
    async fn test_search_and_author_books() {
        let catalog = catalog().await;
        let author = catalog
            .create_author(
                &anon(),
                CreateAuthor {
                    name: "Frank Herbert".into(),
                    bio: None,
                },
            )
            .await
            .unwrap()
            .value;
        catalog
            .create_book(
                &anon(),
                CreateBook {
                    author_ids: vec![author.id],
                    ..dune()
                },
            )
            .await
            .unwrap();

        let page = Pagination::default();
        let by_term = BookSearch {
            query: Some("dune".into()),
            ..Default::default()
        };
        let found = catalog.search_books(&anon(), by_term, page).await.unwrap();
        assert_eq!(found.value.total, 1);
        assert_eq!(found.value.items[0].authors[0].name, "Frank Herbert");

        let by_author = catalog.author_books(&anon(), author.id, page).await.unwrap();
        assert_eq!(by_author.value.total, 1);
        assert_matches!(
            catalog.author_books(&anon(), 999, page).await,
            Err(AppError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_books_carry_genres_and_filter_by_genre() {
        let catalog = catalog().await;
        let genre = catalog
            .create_genre(
                &anon(),
                CreateGenre {
                    name: "Science Fiction".into(),
                    description: None,
                },
            )
            .await
            .unwrap()
            .value;
        let book = catalog
            .create_book(
                &anon(),
                CreateBook {
                    genre_ids: vec![genre.id],
                    ..dune()
                },
            )
            .await
            .unwrap()
            .value;
        assert_eq!(book.genres, vec![genre.clone()]);

        let by_genre = BookSearch {
            genre_id: Some(genre.id),
            ..Default::default()
        };
        let found = catalog
            .search_books(&anon(), by_genre, Pagination::default())
            .await
            .unwrap();
        assert_eq!(found.value.total, 1);

        let unknown_genre = UpdateBook {
            genre_ids: Some(vec![42]),
            ..Default::default()
        };
        assert_matches!(
            catalog.update_book(&anon(), book.id, unknown_genre).await,
            Err(AppError::BadRequest(_))
        );
    }

    #[tokio::test]
    async fn test_rejected_write_still_counts_against_write_limit() {
        let config = Config {
            rate_limit: RateLimitPolicy {
                anonymous: TierLimits {
                    read: 10,
                    search: 10,
                    write: 1,
                },
                ..RateLimitPolicy::default()
            },
            ..Config::default()
        };
        let catalog = catalog_with(&config).await;
        let blank = CreateBook {
            title: "".into(),
            ..Default::default()
        };

        assert_matches!(catalog.create_book(&anon(), blank).await, Err(AppError::BadRequest(_)));
        assert_matches!(
            catalog.create_book(&anon(), dune()).await,
            Err(AppError::RateLimited(_))
        );
        assert_eq!(catalog.db().books().list(Pagination::default()).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_book() {
        let catalog = catalog().await;
        assert_matches!(catalog.delete_book(&anon(), 1).await, Err(AppError::NotFound(_)));
    }
}
