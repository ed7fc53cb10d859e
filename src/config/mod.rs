//! Application configuration management

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::admission::{CacheTtls, FailMode, RateLimitPolicy, TierLimits};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host
    pub host: String,

    /// Server port
    pub port: u16,

    /// SQLite connection URL
    pub database_url: String,

    /// Maximum pooled database connections
    pub database_max_connections: u32,

    /// HS256 secret for access tokens
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    pub access_token_lifetime: i64,

    /// Bcrypt cost factor for password hashing
    pub bcrypt_cost: u32,

    /// Key accepted on `X-API-Key` without a database lookup
    pub admin_api_key: Option<String>,

    /// When false, the response cache never stores anything
    pub cache_enabled: bool,

    /// Per-resource-class cache lifetimes
    pub cache_ttls: CacheTtls,

    /// Rate limiting tiers, window and backend failure policy
    pub rate_limit: RateLimitPolicy,

    /// How often connections are pinged
    pub ws_heartbeat_interval: Duration,

    /// Connections silent for longer than this are pruned
    pub ws_heartbeat_timeout: Duration,

    /// Outbound queue depth per WebSocket connection
    pub ws_send_queue: usize,

    /// Log output format: "text" or "json"
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format '{}', expected 'text' or 'json'", other),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: "sqlite://./data/bookshelf.db?mode=rwc".to_string(),
            database_max_connections: 5,
            jwt_secret: "change-me-in-production".to_string(),
            access_token_lifetime: 30 * 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_api_key: None,
            cache_enabled: true,
            cache_ttls: CacheTtls::default(),
            rate_limit: RateLimitPolicy::default(),
            ws_heartbeat_interval: Duration::from_secs(30),
            ws_heartbeat_timeout: Duration::from_secs(90),
            ws_send_queue: 64,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let window = Duration::from_secs(parse_or("RATE_LIMIT_WINDOW", 60u64)?);
        let anonymous = TierLimits {
            read: parse_or("RATE_LIMIT_READ", defaults.rate_limit.anonymous.read)?,
            search: parse_or("RATE_LIMIT_SEARCH", defaults.rate_limit.anonymous.search)?,
            write: parse_or("RATE_LIMIT_WRITE", defaults.rate_limit.anonymous.write)?,
        };
        let api_key = TierLimits {
            read: parse_or("RATE_LIMIT_KEY_READ", defaults.rate_limit.api_key.read)?,
            search: parse_or("RATE_LIMIT_KEY_SEARCH", defaults.rate_limit.api_key.search)?,
            write: parse_or("RATE_LIMIT_KEY_WRITE", defaults.rate_limit.api_key.write)?,
        };

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using the development secret");
            defaults.jwt_secret.clone()
        });

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", defaults.port)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            jwt_secret: jwt_secret.trim().to_string(),
            access_token_lifetime: parse_or(
                "ACCESS_TOKEN_LIFETIME",
                defaults.access_token_lifetime,
            )?,
            bcrypt_cost: parse_or("BCRYPT_COST", defaults.bcrypt_cost)?,
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            cache_enabled: parse_bool_or("CACHE_ENABLED", defaults.cache_enabled)?,
            cache_ttls: CacheTtls {
                item: Duration::from_secs(parse_or("CACHE_TTL_ITEM", 300u64)?),
                search: Duration::from_secs(parse_or("CACHE_TTL_SEARCH", 120u64)?),
                listing: Duration::from_secs(parse_or("CACHE_TTL_LISTING", 600u64)?),
            },
            rate_limit: RateLimitPolicy {
                enabled: parse_bool_or("RATE_LIMIT_ENABLED", true)?,
                window,
                anonymous,
                api_key,
                on_backend_failure: parse_or("RATE_LIMIT_FAIL_MODE", FailMode::Open)?,
            },
            ws_heartbeat_interval: Duration::from_secs(parse_or("WS_HEARTBEAT_INTERVAL", 30u64)?),
            ws_heartbeat_timeout: Duration::from_secs(parse_or("WS_HEARTBEAT_TIMEOUT", 90u64)?),
            ws_send_queue: parse_or("WS_SEND_QUEUE", defaults.ws_send_queue)?,
            log_format: parse_or("LOG_FORMAT", defaults.log_format)?,
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset.
/// A set-but-invalid value is an error.
fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid {}: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_bool_or(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("Invalid {}: '{}'", name, raw),
        },
        Err(_) => Ok(default),
    }
}
