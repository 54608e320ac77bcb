use crate::types::{CompletionResult, FinishReason, TokenUsage};
use crate::{BoxStream, Error, ErrorContext, Result};
use futures::StreamExt;
use serde_json::Value;

/// Folds OpenAI-style streaming chunks into one [`CompletionResult`].
///
/// The concatenation of every `choices[0].delta.content` equals the
/// `choices[0].message.content` a non-streaming call would have returned.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
    chunks: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &Value) -> Result<()> {
        if let Some(err) = chunk.get("error") {
            return Err(upstream_error_event(err));
        }

        self.chunks += 1;
        if let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) {
            if let Some(delta) = choice
                .get("delta")
                .and_then(|d| d.get("content"))
                .and_then(Value::as_str)
            {
                self.text.push_str(delta);
            }
            if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                self.finish_reason = Some(reason.to_string());
            }
        }
        if let Some(usage) = parse_usage(chunk) {
            self.usage = Some(usage);
        }
        Ok(())
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn finish(self) -> CompletionResult {
        CompletionResult {
            text: self.text,
            finish_reason: FinishReason::from_upstream(self.finish_reason.as_deref()),
            usage: self.usage,
        }
    }
}

/// Drain a decoded SSE stream into a single result.
pub async fn collect_stream(mut events: BoxStream<'static, Value>) -> Result<CompletionResult> {
    let mut acc = Accumulator::new();
    while let Some(event) = events.next().await {
        acc.push_chunk(&event?)?;
    }
    if acc.chunks() == 0 {
        return Err(Error::runtime_with_context(
            "Upstream stream ended without any completion chunks",
            ErrorContext::new().with_source("accumulator"),
        ));
    }
    Ok(acc.finish())
}

/// Extract the result from a whole (non-streaming) chat completion body.
pub fn from_response(body: &Value) -> Result<CompletionResult> {
    if let Some(err) = body.get("error") {
        return Err(upstream_error_event(err));
    }

    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| {
            Error::runtime_with_context(
                "No choices returned from the model",
                ErrorContext::new()
                    .with_field_path("choices")
                    .with_source("response_parser"),
            )
        })?;

    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(CompletionResult {
        text,
        finish_reason: FinishReason::from_upstream(
            choice.get("finish_reason").and_then(Value::as_str),
        ),
        usage: parse_usage(body),
    })
}

fn parse_usage(v: &Value) -> Option<TokenUsage> {
    let usage = v.get("usage")?;
    if usage.is_null() {
        return None;
    }
    serde_json::from_value(usage.clone()).ok()
}

fn upstream_error_event(err: &Value) -> Error {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    Error::runtime_with_context(
        format!("Upstream reported an error: {}", message),
        ErrorContext::new().with_source("accumulator"),
    )
}
