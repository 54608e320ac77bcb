//! End-to-end tool calls through the dispatcher with a real client and a mock upstream.

use crate::integration::mock_server::{completion_body, MockServerFixture};
use llm_relay::mcp::{Dispatcher, JsonRpcRequest, ToolRegistry};
use llm_relay::models::ModelValidator;
use serde_json::{json, Value};
use std::sync::Arc;

async fn call(dispatcher: &Dispatcher, arguments: Value) -> Value {
    let req: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": "complete", "arguments": arguments }
    }))
    .unwrap();
    let resp = dispatcher.dispatch(req).await.expect("request gets a response");
    serde_json::to_value(resp).unwrap()
}

fn dispatcher_for(fixture: &MockServerFixture) -> Dispatcher {
    let client = fixture.client(MockServerFixture::fast_retry(2));
    Dispatcher::new(
        ToolRegistry::standard(Arc::new(client), ModelValidator::default())
            .expect("standard tools register"),
    )
}

#[tokio::test]
async fn test_default_request_returns_text() {
    let fixture = MockServerFixture::new().await;
    let ok = fixture
        .mock_json_response(&completion_body("Hi! How can I help?", "stop"), 1)
        .await;

    let resp = call(
        &dispatcher_for(&fixture),
        json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    let result = &resp["result"];
    assert!(resp.get("error").is_none());
    assert!(!result["content"][0]["text"].as_str().unwrap().is_empty());
    let finish = result["_meta"]["finish_reason"].as_str().unwrap();
    assert!(finish == "stop" || finish == "length");
    ok.assert_async().await;
}

#[tokio::test]
async fn test_unsupported_model_never_reaches_upstream() {
    let fixture = MockServerFixture::new().await;
    let never = fixture
        .mock_json_response(&completion_body("should not happen", "stop"), 0)
        .await;

    let resp = call(
        &dispatcher_for(&fixture),
        json!({"model": "llama-70b", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(resp["result"]["isError"], json!(true));
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("gpt-4o"));
    assert!(text.contains("anthropic.claude-3-7-sonnet-20250219-v1:0"));
    never.assert_async().await;
}

#[tokio::test]
async fn test_exhausted_upstream_is_tool_content_not_rpc_error() {
    let fixture = MockServerFixture::new().await;
    let failing = fixture
        .mock_error_response(500, r#"{"error":{"message":"boom"}}"#, &[], 3)
        .await;

    let resp = call(
        &dispatcher_for(&fixture),
        json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert!(resp.get("error").is_none());
    assert_eq!(resp["result"]["isError"], json!(true));
    assert_eq!(resp["result"]["_meta"]["finish_reason"], json!("error"));
    failing.assert_async().await;
}
