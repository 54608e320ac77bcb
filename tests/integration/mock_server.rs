//! Mock HTTP server setup for integration tests

use llm_relay::config::{PoolConfig, RetryConfig};
use llm_relay::{CompletionClient, CompletionClientBuilder};
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Client pointed at the mock server with short, test-friendly backoff.
    pub fn client(&self, retry: RetryConfig) -> CompletionClient {
        CompletionClientBuilder::new()
            .base_url_override(&self.base_url)
            .api_key("test-key")
            .pool(PoolConfig {
                request_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(2),
                http2_enabled: false,
                ..PoolConfig::default()
            })
            .retry(retry)
            .build()
            .expect("client builds")
    }

    pub fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Create a mock for a successful streaming response (SSE)
    pub async fn mock_sse_stream(&self, chunks: Vec<&str>) -> Mock {
        let mut server = self.server.lock().await;

        // Build SSE response body
        let body = chunks
            .iter()
            .map(|chunk| {
                if chunk.starts_with("data: ") {
                    format!("{}\n\n", chunk)
                } else {
                    format!("data: {}\n\n", chunk)
                }
            })
            .collect::<Vec<_>>()
            .join("");

        server
            .mock("POST", COMPLETIONS_PATH)
            .match_body(Matcher::PartialJson(serde_json::json!({ "stream": true })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    /// Create a mock for a successful JSON response
    pub async fn mock_json_response(&self, body: &str, hits: usize) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", COMPLETIONS_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// Create a mock for an error response
    pub async fn mock_error_response(
        &self,
        status: usize,
        error_body: &str,
        headers: &[(&str, &str)],
        hits: usize,
    ) -> Mock {
        let mut server = self.server.lock().await;
        let mut mock = server
            .mock("POST", COMPLETIONS_PATH)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(error_body);
        for (name, value) in headers {
            mock = mock.with_header(*name, *value);
        }
        mock.expect(hits).create_async().await
    }
}

pub fn completion_body(text: &str, finish_reason: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": finish_reason
        }],
        "usage": { "prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13 }
    })
    .to_string()
}
