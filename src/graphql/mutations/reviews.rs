//! Review mutations need a bearer token; the caller becomes the author.

use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::catalog::Catalog;
use crate::graphql::auth::ClientExt;
use crate::graphql::types::{CreateReviewInput, ReviewType, UpdateReviewInput};

#[derive(Default)]
pub struct ReviewMutations;

#[Object]
impl ReviewMutations {
    async fn create_review(
        &self,
        ctx: &Context<'_>,
        book_id: i64,
        input: CreateReviewInput,
    ) -> Result<ReviewType> {
        let client = ctx.client()?;
        let principal = ctx.principal()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .create_review(&client.subject, principal, book_id, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    /// Only the review's author may edit it
    async fn update_review(
        &self,
        ctx: &Context<'_>,
        id: i64,
        input: UpdateReviewInput,
    ) -> Result<ReviewType> {
        let client = ctx.client()?;
        let principal = ctx.principal()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        let served = catalog
            .update_review(&client.subject, principal, id, input.into())
            .await
            .map_err(|e| e.extend())?;
        Ok(served.value.into())
    }

    async fn delete_review(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        let client = ctx.client()?;
        let principal = ctx.principal()?;
        let catalog = ctx.data_unchecked::<Catalog>();
        catalog
            .delete_review(&client.subject, principal, id)
            .await
            .map_err(|e| e.extend())?;
        Ok(true)
    }
}
