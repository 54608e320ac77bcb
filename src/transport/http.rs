use crate::config::{PoolConfig, UpstreamConfig};
use crate::error::TimeoutPhase;
use crate::{Error, Result};
use std::time::Duration;

/// Long-lived pooled HTTP client for the upstream completion endpoint.
///
/// Built once from [`PoolConfig`]; `reqwest::Client` handles connection checkout and
/// return internally, so a shared reference is all concurrent callers need.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(upstream: &UpstreamConfig, pool: &PoolConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(pool.request_timeout)
            .connect_timeout(pool.connect_timeout)
            .pool_max_idle_per_host(pool.max_keepalive_connections)
            .pool_idle_timeout(Some(pool.idle_timeout))
            .tcp_keepalive(Some(Duration::from_secs(60)));

        if pool.http2_enabled {
            // Negotiated via ALPN on TLS endpoints; plain http stays on HTTP/1.1.
            builder = builder
                .http2_adaptive_window(true)
                .http2_keep_alive_interval(Some(Duration::from_secs(30)))
                .http2_keep_alive_timeout(Duration::from_secs(10));
        } else {
            builder = builder.http1_only();
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            api_key: upstream.api_key.clone(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and return the raw response, whatever its status.
    ///
    /// `timeout` overrides the client-wide request timeout for this call only.
    pub async fn post_json(
        &self,
        path: &str,
        request_body: &serde_json::Value,
        stream: bool,
        timeout: Option<Duration>,
        client_request_id: &str,
    ) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(self.endpoint(path))
            .json(request_body)
            .header("x-request-id", client_request_id);

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        if stream {
            req = req.header("accept", "text/event-stream");
        }

        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        req.send().await.map_err(map_reqwest_error)
    }
}

/// Classify a reqwest failure, separating the two timeout phases.
pub(crate) fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        let phase = if e.is_connect() {
            TimeoutPhase::Connect
        } else {
            TimeoutPhase::Request
        };
        return Error::Timeout { phase };
    }
    Error::Transport(TransportError::Http(e))
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Connection could not be established (refused, reset, DNS).
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Http(e) if e.is_connect())
    }
}
