//! 单次请求执行：流式与非流式的一次上游调用。
//!
//! Request execution logic (single attempt). Retry decisions live in the caller.

use crate::pipeline::{collect_stream, from_response, SseDecoder};
use crate::transport::http::map_reqwest_error;
use crate::types::{CompletionRequest, CompletionResult};
use crate::{BoxStream, Error, Result};
use futures::TryStreamExt;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use super::core::CompletionClient;
use super::error_classification::{error_class_for_status, is_retryable_error_class};
use super::preflight::PreflightExt;

impl CompletionClient {
    fn error_message_from_body(body: &str) -> String {
        // Prefer the common OpenAI-style error shape, fall back to the raw body.
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| {
                json.get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .map(|m| match m.as_str() {
                        Some(s) => s.to_string(),
                        None => m.to_string(),
                    })
            })
            .unwrap_or_else(|| body.trim().to_string())
    }

    fn is_event_stream(resp: &reqwest::Response) -> bool {
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false)
    }

    /// Issue one upstream call and parse its result.
    pub(crate) async fn execute_once(
        &self,
        request: &CompletionRequest,
        client_request_id: &str,
    ) -> Result<CompletionResult> {
        let _permit = PreflightExt::preflight(self).await?;
        let body = serde_json::to_value(request)?;

        let start = Instant::now();
        let resp = self
            .transport
            .post_json(
                &self.completions_path,
                &body,
                request.stream,
                request.timeout,
                client_request_id,
            )
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let class = error_class_for_status(status);
            let retry_after_ms = PreflightExt::retry_after_ms(self, resp.headers());
            let upstream = PreflightExt::header_first(
                self,
                resp.headers(),
                &["x-request-id", "request-id", "x-litellm-call-id"],
            );
            let body = resp.text().await.unwrap_or_default();

            info!(
                http_status = status,
                error_class = class,
                request_id = client_request_id,
                upstream_id = upstream.as_deref(),
                retry_after_ms,
                duration_ms = start.elapsed().as_millis() as u64,
                "upstream completion attempt failed"
            );

            return Err(Error::Remote {
                status,
                message: Self::error_message_from_body(&body),
                retryable: is_retryable_error_class(class),
                retry_after_ms,
            });
        }

        // Some proxies ignore `stream: true` and answer with a whole JSON body.
        if request.stream && Self::is_event_stream(&resp) {
            let byte_stream: BoxStream<'static, bytes::Bytes> =
                Box::pin(resp.bytes_stream().map_err(map_reqwest_error));
            let result = collect_stream(SseDecoder::default().decode_stream(byte_stream)).await?;
            debug!(
                request_id = client_request_id,
                duration_ms = start.elapsed().as_millis() as u64,
                "aggregated streamed completion"
            );
            return Ok(result);
        }

        let bytes = resp.bytes().await.map_err(map_reqwest_error)?;
        let json: Value = serde_json::from_slice(&bytes)?;
        from_response(&json)
    }
}
