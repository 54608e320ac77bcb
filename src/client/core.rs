use crate::config::ServerConfig;
use crate::transport::HttpTransport;
use crate::types::{CompletionRequest, CompletionResult};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use super::builder::CompletionClientBuilder;
use super::metrics::{PerformanceMonitor, PerformanceStats};
use super::policy::{Decision, RetryPolicy};

/// Anything that can turn a validated request into a result.
///
/// Implementations never fail: upstream problems come back as a result with
/// `finish_reason = Error`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult;
}

/// Completion proxy client: one pooled transport shared by every in-flight call.
pub struct CompletionClient {
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) policy: RetryPolicy,
    pub(crate) inflight: Arc<Semaphore>,
    pub(crate) completions_path: String,
    pub(crate) slow_request_threshold: Duration,
    pub(crate) metrics: PerformanceMonitor,
}

impl CompletionClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        CompletionClientBuilder::from_config(config).build()
    }

    pub fn builder() -> CompletionClientBuilder {
        CompletionClientBuilder::new()
    }

    /// Counters since startup; all zero when performance metrics are disabled.
    pub fn performance_stats(&self) -> PerformanceStats {
        self.metrics.snapshot()
    }

    /// Run the request with retries and fold any final failure into the result.
    pub async fn complete(&self, request: &CompletionRequest) -> CompletionResult {
        let client_request_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let (outcome, attempts) = self.complete_with_retry(request, &client_request_id).await;
        let elapsed = start.elapsed();

        let slow = elapsed > self.slow_request_threshold;
        if slow {
            warn!(
                request_id = client_request_id.as_str(),
                model = request.model.as_str(),
                duration_ms = elapsed.as_millis() as u64,
                threshold_ms = self.slow_request_threshold.as_millis() as u64,
                "slow upstream completion"
            );
        }

        if let Some(stats) = self.metrics.record(elapsed, slow, outcome.is_err()) {
            info!(
                requests = stats.requests,
                failures = stats.failures,
                slow_requests = stats.slow_requests,
                slow_pct = stats.slow_request_percentage(),
                avg_response_ms = stats.average_response_time().as_millis() as u64,
                "upstream performance"
            );
        }

        match outcome {
            Ok(result) => {
                info!(
                    request_id = client_request_id.as_str(),
                    model = request.model.as_str(),
                    attempts,
                    stream = request.stream,
                    duration_ms = elapsed.as_millis() as u64,
                    finish_reason = result.finish_reason.as_str(),
                    total_tokens = result.usage.map(|u| u.total_tokens),
                    "upstream completion finished"
                );
                result
            }
            Err(err) => {
                warn!(
                    request_id = client_request_id.as_str(),
                    model = request.model.as_str(),
                    attempts,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "upstream completion failed"
                );
                CompletionResult::failure(describe_failure(&err, attempts))
            }
        }
    }

    /// Returns the final outcome and how many attempts were made.
    pub(crate) async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
        client_request_id: &str,
    ) -> (Result<CompletionResult>, u32) {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.execute_once(request, client_request_id).await {
                Ok(result) => return (Ok(result), attempt + 1),
                Err(err) => err,
            };

            match self.policy.decide(&err, attempt) {
                Decision::Retry { delay } => {
                    warn!(
                        request_id = client_request_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upstream failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Decision::Fail => return (Err(err), attempt + 1),
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult {
        CompletionClient::complete(self, &request).await
    }
}

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Human-readable description for the tool-level failure content.
pub(crate) fn describe_failure(err: &Error, attempts: u32) -> String {
    let detail = match err {
        Error::Remote {
            status, message, ..
        } => {
            let mut body: String = message.chars().take(MAX_ERROR_BODY_CHARS).collect();
            if message.chars().count() > MAX_ERROR_BODY_CHARS {
                body.push_str("...");
            }
            format!("upstream returned HTTP {}: {}", status, body)
        }
        other => other.to_string(),
    };
    if attempts > 1 {
        format!("LLM API error after {} attempts: {}", attempts, detail)
    } else {
        format!("LLM API error: {}", detail)
    }
}
