//! 流式响应处理：把上游 SSE 字节流还原为单个补全结果。
//!
//! # Response Pipeline
//!
//! ```text
//! Raw Bytes → SseDecoder → JSON chunks → Accumulator → CompletionResult
//! ```
//!
//! Streaming responses are always aggregated before the tool call answers; the
//! non-streaming path goes straight through [`accumulate::from_response`]. Both
//! produce identical text for identical upstream content.

pub mod accumulate;
pub mod decode;

pub use accumulate::{collect_stream, from_response, Accumulator};
pub use decode::SseDecoder;
