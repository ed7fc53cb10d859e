use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::db::Pagination;
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{BookPage, GenrePage, GenreType};

#[derive(Default)]
pub struct GenreQueries;

#[Object]
impl GenreQueries {
    async fn genre(&self, ctx: &Context<'_>, id: i64) -> Result<GenreType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .get_genre(&client.subject, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn genres(
        &self,
        ctx: &Context<'_>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<GenrePage> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .list_genres(&client.subject, Pagination::new(page, per_page))
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn genre_books(
        &self,
        ctx: &Context<'_>,
        genre_id: i64,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<BookPage> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .genre_books(&client.subject, genre_id, Pagination::new(page, per_page))
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }
}
