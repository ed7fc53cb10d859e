//! Test doubles for backing stores.

use std::time::Duration;

use async_trait::async_trait;

use super::StoreError;
use super::cache::CacheStore;
use super::rate_limit::{RateLimitStore, WindowState};

/// A store whose backend is always down.
pub(crate) struct UnreachableStore;

fn refused() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(refused())
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(refused())
    }

    async fn delete_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Err(refused())
    }
}

#[async_trait]
impl RateLimitStore for UnreachableStore {
    async fn acquire(
        &self,
        _key: &str,
        _ceiling: u32,
        _window: Duration,
    ) -> Result<WindowState, StoreError> {
        Err(refused())
    }
}
