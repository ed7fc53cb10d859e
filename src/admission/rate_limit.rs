//! Fixed-window rate limiting per subject and endpoint class
//!
//! A window opens on the first request for a counter key and closes
//! `window` later. Counters live in a [`RateLimitStore`] that performs the
//! check-and-increment atomically, so concurrent requests from one subject
//! can never be admitted past the ceiling.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{AdmissionError, StoreError};

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Anonymous client identified by address
    Ip(String),
    /// Client presenting a valid API key
    ApiKey(String),
}

impl Subject {
    pub fn tier(&self) -> Tier {
        match self {
            Subject::Ip(_) => Tier::Anonymous,
            Subject::ApiKey(_) => Tier::ApiKey,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Ip(addr) => write!(f, "ip:{}", addr),
            Subject::ApiKey(id) => write!(f, "key:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Anonymous,
    ApiKey,
}

/// Endpoint classes with independent ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Read,
    Search,
    Write,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Read => "read",
            EndpointClass::Search => "search",
            EndpointClass::Write => "write",
        }
    }
}

/// Ceilings per endpoint class for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub read: u32,
    pub search: u32,
    pub write: u32,
}

impl TierLimits {
    pub fn ceiling(&self, class: EndpointClass) -> u32 {
        match class {
            EndpointClass::Read => self.read,
            EndpointClass::Search => self.search,
            EndpointClass::Write => self.write,
        }
    }
}

/// What to do when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Admit the request unmetered
    Open,
    /// Reject the request as unavailable
    Closed,
}

impl FromStr for FailMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailMode::Open),
            "closed" => Ok(FailMode::Closed),
            other => anyhow::bail!("unknown fail mode '{}', expected 'open' or 'closed'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub window: Duration,
    pub anonymous: TierLimits,
    pub api_key: TierLimits,
    pub on_backend_failure: FailMode,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(60),
            anonymous: TierLimits {
                read: 100,
                search: 60,
                write: 30,
            },
            api_key: TierLimits {
                read: 1000,
                search: 600,
                write: 300,
            },
            on_backend_failure: FailMode::Open,
        }
    }
}

impl RateLimitPolicy {
    pub fn ceiling(&self, tier: Tier, class: EndpointClass) -> u32 {
        match tier {
            Tier::Anonymous => self.anonymous.ceiling(class),
            Tier::ApiKey => self.api_key.ceiling(class),
        }
    }
}

/// Counter state after an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub admitted: bool,
    /// Requests counted in the current window, never above the ceiling
    pub count: u32,
    pub resets_in: Duration,
}

/// Backing store for window counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically count one request against `key` if the current window is
    /// below `ceiling`, opening a new window when none is active.
    async fn acquire(
        &self,
        key: &str,
        ceiling: u32,
        window: Duration,
    ) -> Result<WindowState, StoreError>;
}

struct Counter {
    started: Instant,
    window: Duration,
    count: u32,
}

impl Counter {
    fn expired(&self, now: Instant) -> bool {
        now >= self.started + self.window
    }
}

const SWEEP_EVERY: u64 = 1024;

/// In-memory counter store.
pub struct MemoryRateLimitStore {
    counters: Mutex<HashMap<String, Counter>>,
    calls: AtomicU64,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    fn sweep(&self, now: Instant) {
        self.counters.lock().retain(|_, c| !c.expired(now));
    }
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn acquire(
        &self,
        key: &str,
        ceiling: u32,
        window: Duration,
    ) -> Result<WindowState, StoreError> {
        let now = Instant::now();
        if self.calls.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }

        let mut counters = self.counters.lock();
        let counter = counters.entry(key.to_string()).or_insert(Counter {
            started: now,
            window,
            count: 0,
        });
        if counter.expired(now) {
            *counter = Counter {
                started: now,
                window,
                count: 0,
            };
        }

        let admitted = counter.count < ceiling;
        if admitted {
            counter.count += 1;
        }

        Ok(WindowState {
            admitted,
            count: counter.count,
            resets_in: (counter.started + counter.window).saturating_duration_since(now),
        })
    }
}

/// A request refused for exceeding its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub limit: u32,
    pub window: Duration,
    pub retry_after: Duration,
}

impl RateLimitRejection {
    /// Whole seconds to wait, rounded up and never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

/// Quota information for an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    /// `None` when the request was not metered (limiting disabled or the
    /// store failed open)
    pub remaining: Option<u32>,
    pub window: Duration,
}

/// Applies a [`RateLimitPolicy`] against a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    /// Count a request and decide whether it may proceed.
    pub async fn check(
        &self,
        subject: &Subject,
        class: EndpointClass,
    ) -> Result<RateLimitStatus, AdmissionError> {
        let limit = self.policy.ceiling(subject.tier(), class);
        let window = self.policy.window;

        if !self.policy.enabled {
            return Ok(RateLimitStatus {
                limit,
                remaining: None,
                window,
            });
        }

        let key = format!("rl:{}:{}", class.as_str(), subject);
        match self.store.acquire(&key, limit, window).await {
            Ok(state) if state.admitted => {
                debug!(
                    subject = %subject,
                    class = class.as_str(),
                    count = state.count,
                    limit,
                    "Request admitted"
                );
                Ok(RateLimitStatus {
                    limit,
                    remaining: Some(limit.saturating_sub(state.count)),
                    window,
                })
            }
            Ok(state) => {
                warn!(
                    subject = %subject,
                    class = class.as_str(),
                    limit,
                    retry_after_ms = state.resets_in.as_millis() as u64,
                    "Rate limit exceeded"
                );
                Err(AdmissionError::RateLimited(RateLimitRejection {
                    limit,
                    window,
                    retry_after: state.resets_in,
                }))
            }
            Err(e) => match self.policy.on_backend_failure {
                FailMode::Open => {
                    warn!(
                        subject = %subject,
                        error = %e,
                        "Rate limit store unavailable, failing open"
                    );
                    Ok(RateLimitStatus {
                        limit,
                        remaining: None,
                        window,
                    })
                }
                FailMode::Closed => {
                    warn!(
                        subject = %subject,
                        error = %e,
                        "Rate limit store unavailable, failing closed"
                    );
                    Err(AdmissionError::RateLimitUnavailable)
                }
            },
        }
    }
}
