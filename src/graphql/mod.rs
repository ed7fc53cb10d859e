//! GraphQL facade
//!
//! Mirrors the book, author, genre and review endpoints of the REST API.
//! Resolvers call the same [`Catalog`](crate::catalog::Catalog)
//! operations, so rate limiting, caching, invalidation and event
//! publication behave identically.
//!
//! Queries and mutations are split by domain and combined with
//! `#[derive(MergedObject)]` in `schema.rs`.

pub mod auth;
pub mod handler;
pub mod mutations;
pub mod queries;
pub mod schema;
pub mod types;

pub use handler::router;
pub use schema::{BookshelfSchema, build_schema};
