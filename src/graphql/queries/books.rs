use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::db::{BookSearch, Pagination};
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{BookPage, BookType};

#[derive(Default)]
pub struct BookQueries;

#[Object]
impl BookQueries {
    /// Get a book by ID
    async fn book(&self, ctx: &Context<'_>, id: i64) -> Result<BookType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .get_book(&client.subject, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    /// List books by title
    async fn books(
        &self,
        ctx: &Context<'_>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<BookPage> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .list_books(&client.subject, Pagination::new(page, per_page))
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    /// Search titles, descriptions and ISBNs, optionally by author or genre
    async fn search_books(
        &self,
        ctx: &Context<'_>,
        query: Option<String>,
        author_id: Option<i64>,
        genre_id: Option<i64>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<BookPage> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let filter = BookSearch {
            query,
            author_id,
            genre_id,
        };
        let served = catalog
            .search_books(&client.subject, filter, Pagination::new(page, per_page))
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }
}
