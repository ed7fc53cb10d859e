use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{AuthorInput, AuthorType, UpdateAuthorInput};

#[derive(Default)]
pub struct AuthorMutations;

#[Object]
impl AuthorMutations {
    async fn create_author(&self, ctx: &Context<'_>, input: AuthorInput) -> Result<AuthorType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .create_author(&client.subject, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn update_author(
        &self,
        ctx: &Context<'_>,
        id: i64,
        input: UpdateAuthorInput,
    ) -> Result<AuthorType> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .update_author(&client.subject, id, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn delete_author(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        let client = ctx.client()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        catalog
            .delete_author(&client.subject, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(true)
    }
}
