use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{GenreInput, GenreType, UpdateGenreInput};

#[derive(Default)]
pub struct GenreMutations;

#[Object]
impl GenreMutations {
    async fn create_genre(&self, ctx: &Context<'_>, input: GenreInput) -> Result<GenreType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .create_genre(&client.subject, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn update_genre(
        &self,
        ctx: &Context<'_>,
        id: i64,
        input: UpdateGenreInput,
    ) -> Result<GenreType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .update_genre(&client.subject, id, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn delete_genre(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        catalog
            .delete_genre(&client.subject, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(true)
    }
}
