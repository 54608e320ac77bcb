use crate::config::{PoolConfig, RetryConfig, ServerConfig, UpstreamConfig};
use crate::transport::HttpTransport;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::core::CompletionClient;
use super::metrics::PerformanceMonitor;
use super::policy::RetryPolicy;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface small: anything not set here comes from [`ServerConfig::default`].
pub struct CompletionClientBuilder {
    upstream: UpstreamConfig,
    pool: PoolConfig,
    retry: RetryConfig,
    slow_request_threshold: Duration,
    performance_metrics: bool,
}

impl CompletionClientBuilder {
    pub fn new() -> Self {
        Self::from_config(&ServerConfig::default())
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            upstream: config.upstream.clone(),
            pool: config.pool.clone(),
            retry: config.retry.clone(),
            slow_request_threshold: config.slow_request_threshold,
            performance_metrics: config.log_performance_metrics,
        }
    }

    pub fn upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.upstream.api_key = Some(key.into());
        self
    }

    /// Point the client at a different proxy (mock servers in tests).
    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.upstream.base_url = base_url.into();
        self
    }

    pub fn slow_request_threshold(mut self, threshold: Duration) -> Self {
        self.slow_request_threshold = threshold;
        self
    }

    pub fn performance_metrics(mut self, enabled: bool) -> Self {
        self.performance_metrics = enabled;
        self
    }

    pub fn build(self) -> Result<CompletionClient> {
        let transport = HttpTransport::new(&self.upstream, &self.pool)?;
        let permits = self.pool.max_connections.max(1);

        Ok(CompletionClient {
            transport: Arc::new(transport),
            policy: RetryPolicy::from_config(&self.retry),
            inflight: Arc::new(Semaphore::new(permits)),
            completions_path: self.upstream.completions_path,
            slow_request_threshold: self.slow_request_threshold,
            metrics: PerformanceMonitor::new(self.performance_metrics),
        })
    }
}

impl Default for CompletionClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
