//! Preflight checks and response header helpers

use crate::{Error, ErrorContext, Result};
use reqwest::header::HeaderMap;
use tokio::sync::OwnedSemaphorePermit;

use super::core::CompletionClient;

// Implemented as an extension trait so execution.rs can stay focused on the attempt itself.
pub(crate) trait PreflightExt {
    async fn preflight(&self) -> Result<OwnedSemaphorePermit>;
    fn header_first(&self, headers: &HeaderMap, names: &[&str]) -> Option<String>;
    fn retry_after_ms(&self, headers: &HeaderMap) -> Option<u32>;
}

impl PreflightExt for CompletionClient {
    /// Acquire an in-flight permit. Held for the whole attempt, body read included,
    /// so `max_connections` bounds concurrent upstream calls.
    async fn preflight(&self) -> Result<OwnedSemaphorePermit> {
        self.inflight.clone().acquire_owned().await.map_err(|_| {
            Error::runtime_with_context(
                "Backpressure semaphore closed",
                ErrorContext::new().with_source("backpressure"),
            )
        })
    }

    /// Extract the first matching header value from a list of header names.
    fn header_first(&self, headers: &HeaderMap, names: &[&str]) -> Option<String> {
        for name in names {
            if let Some(v) = headers.get(*name) {
                if let Ok(s) = v.to_str() {
                    let s = s.trim();
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
        }
        None
    }

    /// Best-effort parsing of the server's delay hint.
    ///
    /// `retry-after-ms` (milliseconds) takes precedence; `Retry-After` is only supported in
    /// its `<seconds>` form.
    fn retry_after_ms(&self, headers: &HeaderMap) -> Option<u32> {
        if let Some(ms) = self
            .header_first(headers, &["retry-after-ms"])
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
        {
            return Some(ms.min(u32::MAX as f64) as u32);
        }
        let raw = self.header_first(headers, &["retry-after"])?;
        let secs: u32 = raw.parse().ok()?;
        Some(secs.saturating_mul(1000))
    }
}
