//! GraphQL schema definition

use async_graphql::{EmptySubscription, MergedObject, Schema};

use super::mutations::{AuthorMutations, BookMutations, GenreMutations, ReviewMutations};
use super::queries::{AuthorQueries, BookQueries, GenreQueries, ReviewQueries};
use crate::catalog::Catalog;

/// The GraphQL schema type
pub type BookshelfSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

#[derive(MergedObject, Default)]
pub struct QueryRoot(BookQueries, AuthorQueries, GenreQueries, ReviewQueries);

#[derive(MergedObject, Default)]
pub struct MutationRoot(BookMutations, AuthorMutations, GenreMutations, ReviewMutations);

/// Build the GraphQL schema with all resolvers
pub fn build_schema(catalog: Catalog) -> BookshelfSchema {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(catalog)
        .finish()
}
