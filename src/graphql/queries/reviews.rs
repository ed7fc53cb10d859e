use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::db::Pagination;
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{ReviewPage, ReviewType};

#[derive(Default)]
pub struct ReviewQueries;

#[Object]
impl ReviewQueries {
    async fn review(&self, ctx: &Context<'_>, id: i64) -> Result<ReviewType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .get_review(&client.subject, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    /// Reviews of a book, newest first
    async fn reviews(
        &self,
        ctx: &Context<'_>,
        book_id: i64,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<ReviewPage> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .list_reviews(&client.subject, book_id, Pagination::new(page, per_page))
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }
}
