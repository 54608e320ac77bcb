//! 类型系统模块：消息与补全请求/结果的核心数据类型。
//!
//! # Types Module
//!
//! Strongly-typed representations of what flows between the tool layer and the
//! completion proxy client.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and content |
//! | [`CompletionRequest`] | Validated request sent upstream |
//! | [`CompletionResult`] | Text plus finish reason (success or described failure) |
//!
//! ## Example
//!
//! ```rust
//! use llm_relay::types::{CompletionRequest, Message};
//!
//! let req = CompletionRequest::new("gpt-4o", vec![Message::user("hi")])
//!     .temperature(0.2)
//!     .max_tokens(256);
//! assert!(!req.stream);
//! ```

pub mod completion;
pub mod message;

pub use completion::{
    CompletionRequest, CompletionResult, FinishReason, TokenUsage, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};
pub use message::{Message, MessageRole};
