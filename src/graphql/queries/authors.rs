use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::db::Pagination;
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{AuthorPage, AuthorType, BookPage};

#[derive(Default)]
pub struct AuthorQueries;

#[Object]
impl AuthorQueries {
    async fn author(&self, ctx: &Context<'_>, id: i64) -> Result<AuthorType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .get_author(&client.subject, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    /// List authors by name
    async fn authors(
        &self,
        ctx: &Context<'_>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<AuthorPage> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .list_authors(&client.subject, Pagination::new(page, per_page))
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn author_books(
        &self,
        ctx: &Context<'_>,
        author_id: i64,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<BookPage> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .author_books(&client.subject, author_id, Pagination::new(page, per_page))
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }
}
