//! Request admission: rate limiting followed by cache lookup
//!
//! Every request passes [`AdmissionControl`] before touching persistence.
//! The rate limit is checked first; reads then consult the response cache
//! and only compute on a miss. Writes invalidate the cache once the
//! persistence call has succeeded.
//!
//! Failures of the cache backend never surface to callers. Failures of the
//! rate-limit backend follow [`FailMode`].

pub mod cache;
pub mod keys;
pub mod rate_limit;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use cache::{CacheStore, CacheTtls, MemoryCacheStore, NoopCacheStore, ResponseCache};
pub use keys::{CacheKey, Invalidation, ResourceClass};
pub use rate_limit::{
    EndpointClass, FailMode, MemoryRateLimitStore, RateLimitPolicy, RateLimitRejection,
    RateLimitStatus, RateLimitStore, RateLimiter, Subject, Tier, TierLimits,
};

use crate::config::Config;

/// Errors raised by a cache or counter backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}

/// Reasons admission control refuses a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("rate limit exceeded: {} per {}s", .0.limit, .0.window.as_secs())]
    RateLimited(RateLimitRejection),
    #[error("rate limiting backend unavailable")]
    RateLimitUnavailable,
}

/// Where a served value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Computed,
}

/// A value that passed admission, with the quota it was counted against.
#[derive(Debug, Clone)]
pub struct Served<T> {
    pub value: T,
    pub source: Source,
    pub rate: RateLimitStatus,
}

impl<T> Served<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            value: f(self.value),
            source: self.source,
            rate: self.rate,
        }
    }
}

/// Outcome of [`AdmissionControl::admit`] when the request may proceed.
#[derive(Debug)]
pub enum Decision<T> {
    /// A live cache entry answers the request
    Cached(T, RateLimitStatus),
    /// Nothing cached; the caller must compute
    Compute(RateLimitStatus),
}

/// The rate limiter and response cache, owned together.
#[derive(Clone)]
pub struct AdmissionControl {
    limiter: RateLimiter,
    cache: ResponseCache,
}

impl AdmissionControl {
    pub fn new(limiter: RateLimiter, cache: ResponseCache) -> Self {
        Self { limiter, cache }
    }

    /// Build with in-memory stores according to configuration.
    pub fn in_memory(config: &Config) -> Self {
        let store: Arc<dyn CacheStore> = if config.cache_enabled {
            Arc::new(MemoryCacheStore::new())
        } else {
            Arc::new(NoopCacheStore)
        };
        Self::new(
            RateLimiter::new(
                Arc::new(MemoryRateLimitStore::new()),
                config.rate_limit.clone(),
            ),
            ResponseCache::new(store, config.cache_ttls),
        )
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Rate-limit check, then exact-match cache lookup.
    pub async fn admit<T: DeserializeOwned>(
        &self,
        subject: &Subject,
        class: EndpointClass,
        key: &CacheKey,
    ) -> Result<Decision<T>, AdmissionError> {
        let rate = self.limiter.check(subject, class).await?;
        Ok(match self.cache.get(key).await {
            Some(value) => Decision::Cached(value, rate),
            None => Decision::Compute(rate),
        })
    }

    /// Admit a read, serving from cache or computing and populating it.
    ///
    /// Errors from `compute` propagate unchanged and nothing is cached. A value
    /// whose computation overlapped an invalidation is returned but not cached.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        subject: &Subject,
        class: EndpointClass,
        key: &CacheKey,
        compute: F,
    ) -> Result<Served<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<AdmissionError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.admit(subject, class, key).await? {
            Decision::Cached(value, rate) => Ok(Served {
                value,
                source: Source::Cache,
                rate,
            }),
            Decision::Compute(rate) => {
                let generation = self.cache.generation().await;
                let value = compute().await?;
                self.cache.put(key, &value, generation).await;
                Ok(Served {
                    value,
                    source: Source::Computed,
                    rate,
                })
            }
        }
    }

    /// Admit a write, run it, then invalidate before returning.
    ///
    /// Invalidation happens only when `write` succeeds and is finished by the
    /// time this returns, so a subsequent read cannot see the old entry.
    pub async fn write_through<T, E, F, Fut, I>(
        &self,
        subject: &Subject,
        write: F,
        invalidations: I,
    ) -> Result<Served<T>, E>
    where
        E: From<AdmissionError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        I: FnOnce(&T) -> Vec<Invalidation>,
    {
        let rate = self.limiter.check(subject, EndpointClass::Write).await?;
        let value = write().await?;
        for invalidation in invalidations(&value) {
            self.cache.invalidate(invalidation).await;
        }
        Ok(Served {
            value,
            source: Source::Computed,
            rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::admission::testing::UnreachableStore;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Admission(AdmissionError),
        NotFound,
    }

    impl From<AdmissionError> for TestError {
        fn from(e: AdmissionError) -> Self {
            TestError::Admission(e)
        }
    }

    fn control(ttls: CacheTtls) -> AdmissionControl {
        AdmissionControl::new(
            RateLimiter::new(
                Arc::new(MemoryRateLimitStore::new()),
                RateLimitPolicy::default(),
            ),
            ResponseCache::new(Arc::new(MemoryCacheStore::new()), ttls),
        )
    }

    fn subject() -> Subject {
        Subject::Ip("127.0.0.1".into())
    }

    async fn read_book(
        control: &AdmissionControl,
        calls: &AtomicUsize,
        title: &str,
    ) -> Served<String> {
        control
            .read_through::<_, TestError, _, _>(
                &subject(),
                EndpointClass::Read,
                &CacheKey::book(1),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(title.to_string())
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_and_write_invalidation_scenario() {
        let control = control(CacheTtls {
            item: Duration::from_secs(300),
            ..CacheTtls::default()
        });
        let calls = AtomicUsize::new(0);

        // t=0 populates
        let first = read_book(&control, &calls, "Dune").await;
        assert_eq!(first.source, Source::Computed);

        // t=149 still cached
        tokio::time::advance(Duration::from_secs(149)).await;
        let cached = read_book(&control, &calls, "ignored").await;
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(cached.value, "Dune");

        // t=150 write invalidates
        tokio::time::advance(Duration::from_secs(1)).await;
        control
            .write_through::<_, TestError, _, _, _>(
                &subject(),
                || async { Ok(1i64) },
                |id| vec![Invalidation::Book { id: Some(*id) }],
            )
            .await
            .unwrap();

        // t=151 recomputes
        tokio::time::advance(Duration::from_secs(1)).await;
        let after = read_book(&control, &calls, "Dune Messiah").await;
        assert_eq!(after.source, Source::Computed);
        assert_eq!(after.value, "Dune Messiah");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_overlapping_write_does_not_cache_old_value() {
        let control = control(CacheTtls::default());
        let computing = Arc::new(Notify::new());
        let resume = Arc::new(Notify::new());

        let reader = tokio::spawn({
            let control = control.clone();
            let computing = computing.clone();
            let resume = resume.clone();
            async move {
                control
                    .read_through::<_, TestError, _, _>(
                        &subject(),
                        EndpointClass::Read,
                        &CacheKey::book(1),
                        || async {
                            computing.notify_one();
                            resume.notified().await;
                            Ok("old".to_string())
                        },
                    )
                    .await
            }
        });

        computing.notified().await;
        control
            .write_through::<_, TestError, _, _, _>(
                &subject(),
                || async { Ok(1i64) },
                |id| vec![Invalidation::Book { id: Some(*id) }],
            )
            .await
            .unwrap();
        resume.notify_one();

        let stale = reader.await.unwrap().unwrap();
        assert_eq!(stale.value, "old");

        let calls = AtomicUsize::new(0);
        let after = read_book(&control, &calls, "new").await;
        assert_eq!(after.source, Source::Computed);
        assert_eq!(after.value, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_until_ttl_without_writes() {
        let control = control(CacheTtls {
            item: Duration::from_secs(300),
            ..CacheTtls::default()
        });
        let calls = AtomicUsize::new(0);

        read_book(&control, &calls, "Dune").await;
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(read_book(&control, &calls, "x").await.value, "Dune");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(read_book(&control, &calls, "fresh").await.value, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_compute_errors_propagate_and_are_not_cached() {
        let control = control(CacheTtls::default());
        let result = control
            .read_through::<String, _, _, _>(
                &subject(),
                EndpointClass::Read,
                &CacheKey::book(9),
                || async { Err(TestError::NotFound) },
            )
            .await;
        assert_eq!(result.unwrap_err(), TestError::NotFound);
        assert_matches!(
            control.admit::<String>(&subject(), EndpointClass::Read, &CacheKey::book(9)).await,
            Ok(Decision::Compute(_))
        );
    }

    #[tokio::test]
    async fn test_failed_write_does_not_invalidate() {
        let control = control(CacheTtls::default());
        let calls = AtomicUsize::new(0);
        read_book(&control, &calls, "Dune").await;

        let result = control
            .write_through::<i64, _, _, _, _>(
                &subject(),
                || async { Err(TestError::NotFound) },
                |_| vec![Invalidation::Book { id: Some(1) }],
            )
            .await;
        assert!(result.is_err());
        assert_eq!(read_book(&control, &calls, "x").await.source, Source::Cache);
    }

    #[tokio::test]
    async fn test_cache_outage_always_computes() {
        let control = AdmissionControl::new(
            RateLimiter::new(
                Arc::new(MemoryRateLimitStore::new()),
                RateLimitPolicy::default(),
            ),
            ResponseCache::new(Arc::new(UnreachableStore), CacheTtls::default()),
        );
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            assert_eq!(read_book(&control, &calls, "Dune").await.source, Source::Computed);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_precedes_cache() {
        let control = AdmissionControl::new(
            RateLimiter::new(
                Arc::new(MemoryRateLimitStore::new()),
                RateLimitPolicy {
                    anonymous: TierLimits {
                        read: 1,
                        search: 1,
                        write: 1,
                    },
                    ..RateLimitPolicy::default()
                },
            ),
            ResponseCache::new(Arc::new(MemoryCacheStore::new()), CacheTtls::default()),
        );
        let calls = AtomicUsize::new(0);
        read_book(&control, &calls, "Dune").await;

        // Cached, but the subject is out of quota.
        let result = control
            .read_through::<String, TestError, _, _>(
                &subject(),
                EndpointClass::Read,
                &CacheKey::book(1),
                || async { Ok("x".into()) },
            )
            .await;
        assert_matches!(result, Err(TestError::Admission(AdmissionError::RateLimited(_))));
    }
}
