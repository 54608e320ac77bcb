//! Integration tests for retry, backoff and failure reporting against a mock upstream.

use crate::integration::mock_server::{completion_body, MockServerFixture, COMPLETIONS_PATH};
use llm_relay::config::{PoolConfig, RetryConfig};
use llm_relay::{
    CompletionClient, CompletionClientBuilder, CompletionRequest, FinishReason, Message,
};
use mockito::Matcher;
use serde_json::json;
use std::time::{Duration, Instant};

fn hello(model: &str) -> CompletionRequest {
    CompletionRequest::new(model, vec![Message::user("hi")])
}

#[tokio::test]
async fn test_retry_on_transient_error() {
    let fixture = MockServerFixture::new().await;

    // Two 503s, then success. Mocks with outstanding expected hits are matched first.
    let failing = fixture
        .mock_error_response(
            503,
            r#"{"error":{"message":"Service Unavailable"}}"#,
            &[],
            2,
        )
        .await;
    let ok = fixture
        .mock_json_response(&completion_body("Hello!", "stop"), 1)
        .await;

    let client = fixture.client(MockServerFixture::fast_retry(2));
    let start = Instant::now();
    let result = client.complete(&hello("gpt-4o")).await;
    let elapsed = start.elapsed();

    assert_eq!(result.text, "Hello!");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.usage.map(|u| u.total_tokens), Some(13));
    // 50ms + 100ms of backoff
    assert!(elapsed >= Duration::from_millis(150), "elapsed {:?}", elapsed);

    failing.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_retries_exhausted_become_failure_result() {
    let fixture = MockServerFixture::new().await;
    let failing = fixture
        .mock_error_response(502, r#"{"error":{"message":"Bad Gateway"}}"#, &[], 3)
        .await;

    let client = fixture.client(MockServerFixture::fast_retry(2));
    let result = client.complete(&hello("gpt-4o")).await;

    assert!(result.is_error());
    assert_eq!(result.finish_reason, FinishReason::Error);
    assert!(result.text.contains("after 3 attempts"), "{}", result.text);
    assert!(result.text.contains("502"), "{}", result.text);
    failing.assert_async().await;

    let stats = client.performance_stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.failures, 1);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let fixture = MockServerFixture::new().await;
    let unauthorized = fixture
        .mock_error_response(
            401,
            r#"{"error":{"message":"Invalid API key","type":"auth_error"}}"#,
            &[],
            1,
        )
        .await;

    let client = fixture.client(MockServerFixture::fast_retry(2));
    let result = client.complete(&hello("gpt-4o")).await;

    assert!(result.is_error());
    assert!(result.text.contains("401"));
    assert!(result.text.contains("Invalid API key"));
    unauthorized.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_honors_retry_after() {
    let fixture = MockServerFixture::new().await;
    let limited = fixture
        .mock_error_response(
            429,
            r#"{"error":{"message":"Rate limit exceeded","type":"rate_limit_error"}}"#,
            &[("retry-after", "1")],
            1,
        )
        .await;
    let ok = fixture
        .mock_json_response(&completion_body("after the wait", "stop"), 1)
        .await;

    let client = fixture.client(RetryConfig {
        max_retries: 2,
        min_delay: Duration::from_millis(10),
        max_delay: Duration::from_secs(5),
    });
    let start = Instant::now();
    let result = client.complete(&hello("gpt-4o")).await;

    assert_eq!(result.text, "after the wait");
    assert!(start.elapsed() >= Duration::from_secs(1));
    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_retry_after_is_capped_by_max_delay() {
    let fixture = MockServerFixture::new().await;
    let _limited = fixture
        .mock_error_response(
            429,
            r#"{"error":{"message":"slow down"}}"#,
            &[("retry-after", "60")],
            1,
        )
        .await;
    let _ok = fixture
        .mock_json_response(&completion_body("ok", "stop"), 1)
        .await;

    let client = fixture.client(RetryConfig {
        max_retries: 1,
        min_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(200),
    });
    let start = Instant::now();
    let result = client.complete(&hello("gpt-4o")).await;

    assert_eq!(result.text, "ok");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_forwards_model_and_credentials_unchanged() {
    let fixture = MockServerFixture::new().await;
    let model = "anthropic.claude-3-7-sonnet-20250219-v1:0";
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", COMPLETIONS_PATH)
            .match_header("authorization", "Bearer test-key")
            .match_header("x-request-id", Matcher::Regex("^[0-9a-f-]{36}$".into()))
            .match_body(Matcher::PartialJson(json!({
                "model": model,
                "messages": [{ "role": "user", "content": "hi" }],
                "temperature": 0.7,
                "max_tokens": 1000
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("forwarded", "stop"))
            .expect(1)
            .create_async()
            .await
    };

    let client = fixture.client(MockServerFixture::fast_retry(0));
    let result = client.complete(&hello(model)).await;

    assert_eq!(result.text, "forwarded");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_choices_is_not_retried() {
    let fixture = MockServerFixture::new().await;
    let empty = fixture
        .mock_json_response(r#"{"id":"x","choices":[]}"#, 1)
        .await;

    let client = fixture.client(MockServerFixture::fast_retry(2));
    let result = client.complete(&hello("gpt-4o")).await;

    assert!(result.is_error());
    assert!(result.text.contains("No choices returned from the model"));
    empty.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_reported() {
    // Nothing listens on port 1.
    let client = CompletionClientBuilder::new()
        .base_url_override("http://127.0.0.1:1")
        .retry(RetryConfig {
            max_retries: 1,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        })
        .build()
        .expect("client builds");

    let result = client.complete(&hello("gpt-4o")).await;
    assert!(result.is_error());
    assert!(result.text.contains("after 2 attempts"), "{}", result.text);
}

/// An upstream that accepts connections and never answers.
async fn silent_upstream() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (format!("http://{}", addr), handle)
}

fn client_for_silent(base_url: &str, request_timeout: Duration, max_retries: u32) -> CompletionClient {
    CompletionClientBuilder::new()
        .base_url_override(base_url)
        .pool(PoolConfig {
            request_timeout,
            connect_timeout: Duration::from_secs(2),
            http2_enabled: false,
            ..PoolConfig::default()
        })
        .retry(RetryConfig {
            max_retries,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        })
        .build()
        .expect("client builds")
}

#[tokio::test]
async fn test_request_timeout_is_retried_then_reported() {
    let (base_url, upstream) = silent_upstream().await;
    let client = client_for_silent(&base_url, Duration::from_millis(200), 1);

    let start = Instant::now();
    let result = client.complete(&hello("gpt-4o")).await;

    assert_eq!(result.finish_reason, FinishReason::Error);
    assert_eq!(
        result.text,
        "LLM API error after 2 attempts: Upstream request timeout"
    );
    // Two full request timeouts elapsed.
    assert!(start.elapsed() >= Duration::from_millis(400));
    upstream.abort();
}

#[tokio::test]
async fn test_per_request_timeout_overrides_pool_timeout() {
    let (base_url, upstream) = silent_upstream().await;
    let client = client_for_silent(&base_url, Duration::from_secs(30), 0);

    let start = Instant::now();
    let result = client
        .complete(&hello("gpt-4o").timeout(Duration::from_millis(150)))
        .await;

    assert_eq!(result.text, "LLM API error: Upstream request timeout");
    assert!(start.elapsed() < Duration::from_secs(10));
    upstream.abort();
}
