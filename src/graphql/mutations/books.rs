use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{BookType, CreateBookInput, UpdateBookInput};

#[derive(Default)]
pub struct BookMutations;

#[Object]
impl BookMutations {
    /// Create a book and notify `books` subscribers
    async fn create_book(&self, ctx: &Context<'_>, input: CreateBookInput) -> Result<BookType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .create_book(&client.subject, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn update_book(
        &self,
        ctx: &Context<'_>,
        id: i64,
        input: UpdateBookInput,
    ) -> Result<BookType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .update_book(&client.subject, id, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    /// Delete a book. Returns true on success.
    async fn delete_book(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        catalog
            .delete_book(&client.subject, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(true)
    }
}
