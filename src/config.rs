//! 进程级配置：启动时读取一次，之后只读共享。
//!
//! Process-wide configuration, read once at startup and shared read-only afterwards.
//!
//! Values come from the environment (see [`ServerConfig::from_env`]); tests and embedders
//! use [`ServerConfig::from_lookup`] or the `with_*` setters instead.

use crate::{Error, ErrorContext, Result};
use std::time::Duration;

/// Where completions are sent and how the caller authenticates.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub completions_path: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            api_key: None,
            completions_path: "/v1/chat/completions".to_string(),
        }
    }
}

/// Connection pool knobs for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_keepalive_connections: usize,
    /// Upper bound on simultaneous upstream calls.
    pub max_connections: usize,
    pub http2_enabled: bool,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_keepalive_connections: 20,
            max_connections: 100,
            http2_enabled: true,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub upstream: UpstreamConfig,
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub max_concurrent_requests: usize,
    pub shutdown_grace: Duration,
    pub slow_request_threshold: Duration,
    /// Keep running request/latency counters and log them after each call.
    pub log_performance_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            max_concurrent_requests: 16,
            shutdown_grace: Duration::from_secs(10),
            slow_request_threshold: Duration::from_secs(5),
            log_performance_metrics: true,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Absent keys fall back to defaults; present but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = get("LITELLM_PROXY_URL").unwrap_or(defaults.upstream.base_url);
        url::Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid upstream URL '{}': {}", base_url, e),
                ErrorContext::new()
                    .with_field_path("LITELLM_PROXY_URL")
                    .with_source("config"),
            )
        })?;

        let upstream = UpstreamConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: get("LITELLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            completions_path: get("LITELLM_COMPLETIONS_PATH")
                .unwrap_or(defaults.upstream.completions_path),
        };

        let pool = PoolConfig {
            request_timeout: parse_secs(&get, "HTTP_TIMEOUT", defaults.pool.request_timeout)?,
            connect_timeout: parse_secs(
                &get,
                "HTTP_CONNECT_TIMEOUT",
                defaults.pool.connect_timeout,
            )?,
            max_keepalive_connections: parse_value(
                &get,
                "HTTP_MAX_KEEPALIVE_CONNECTIONS",
                defaults.pool.max_keepalive_connections,
            )?,
            max_connections: parse_value(
                &get,
                "HTTP_MAX_CONNECTIONS",
                defaults.pool.max_connections,
            )?
            .max(1),
            http2_enabled: parse_bool(&get, "HTTP_ENABLE_HTTP2", defaults.pool.http2_enabled)?,
            idle_timeout: parse_secs(&get, "HTTP_POOL_IDLE_TIMEOUT", defaults.pool.idle_timeout)?,
        };

        let min_delay = parse_secs(&get, "LITELLM_RETRY_DELAY", defaults.retry.min_delay)?;
        let retry = RetryConfig {
            max_retries: parse_value(&get, "LITELLM_MAX_RETRIES", defaults.retry.max_retries)?,
            min_delay,
            max_delay: parse_secs(&get, "LITELLM_RETRY_MAX_DELAY", defaults.retry.max_delay)?
                .max(min_delay),
        };

        Ok(ServerConfig {
            upstream,
            pool,
            retry,
            max_concurrent_requests: parse_value(
                &get,
                "MCP_MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            )?
            .max(1),
            shutdown_grace: parse_secs(&get, "MCP_SHUTDOWN_GRACE", defaults.shutdown_grace)?,
            slow_request_threshold: parse_secs(
                &get,
                "LOG_SLOW_QUERIES_THRESHOLD",
                defaults.slow_request_threshold,
            )?,
            log_performance_metrics: parse_bool(
                &get,
                "LOG_PERFORMANCE_METRICS",
                defaults.log_performance_metrics,
            )?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.upstream.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.upstream.api_key = Some(api_key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n.max(1);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

fn invalid(key: &str, raw: &str, expected: &str) -> Error {
    Error::configuration_with_context(
        format!("{} has invalid value '{}'", key, raw),
        ErrorContext::new()
            .with_field_path(key)
            .with_details(format!("expected {}", expected))
            .with_source("config"),
    )
}

fn parse_value<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| invalid(key, &raw, "a number")),
        None => Ok(default),
    }
}

fn parse_secs<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .ok_or_else(|| invalid(key, &raw, "a non-negative number of seconds")),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(invalid(key, &raw, "true or false")),
        },
        None => Ok(default),
    }
}
