//! Integration tests for streamed completions against a mock upstream.

use crate::integration::mock_server::{completion_body, MockServerFixture};
use llm_relay::{CompletionRequest, FinishReason, Message};

fn streamed(model: &str) -> CompletionRequest {
    CompletionRequest::new(model, vec![Message::user("count to three")]).stream(true)
}

#[tokio::test]
async fn test_streamed_text_matches_whole_response() {
    let fixture = MockServerFixture::new().await;
    let sse = fixture
        .mock_sse_stream(vec![
            r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"one, "}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"two, "}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"three"},"finish_reason":"length"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":4,"total_tokens":13}}"#,
            "[DONE]",
        ])
        .await;
    let whole = fixture
        .mock_json_response(&completion_body("one, two, three", "length"), 1)
        .await;

    let client = fixture.client(MockServerFixture::fast_retry(0));
    let from_stream = client.complete(&streamed("gpt-4o")).await;
    let from_body = client
        .complete(&CompletionRequest::new(
            "gpt-4o",
            vec![Message::user("count to three")],
        ))
        .await;

    assert_eq!(from_stream.text, "one, two, three");
    assert_eq!(from_stream, from_body);
    assert_eq!(from_stream.finish_reason, FinishReason::Length);

    sse.assert_async().await;
    whole.assert_async().await;
}

#[tokio::test]
async fn test_stream_error_event_is_reported() {
    let fixture = MockServerFixture::new().await;
    let _sse = fixture
        .mock_sse_stream(vec![
            r#"{"choices":[{"index":0,"delta":{"content":"partial"}}]}"#,
            r#"{"error":{"message":"upstream model crashed"}}"#,
        ])
        .await;

    let client = fixture.client(MockServerFixture::fast_retry(0));
    let result = client.complete(&streamed("gpt-4o")).await;

    assert!(result.is_error());
    assert!(result.text.contains("upstream model crashed"), "{}", result.text);
}

#[tokio::test]
async fn test_stream_request_answered_with_json_body() {
    let fixture = MockServerFixture::new().await;
    // Upstream ignored `stream: true` and replied with a whole JSON body.
    let whole = fixture
        .mock_json_response(&completion_body("not streamed after all", "stop"), 1)
        .await;

    let client = fixture.client(MockServerFixture::fast_retry(0));
    let result = client.complete(&streamed("gpt-4o")).await;

    assert_eq!(result.text, "not streamed after all");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    whole.assert_async().await;
}
