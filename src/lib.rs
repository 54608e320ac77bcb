//! # llm-relay
//!
//! 通过 MCP（stdio JSON-RPC）暴露受白名单约束的补全工具，并代理到上游 LiteLLM 服务。
//!
//! MCP tool server that exposes an allow-listed `complete` tool and a `list_models`
//! tool over newline-delimited JSON-RPC, proxying completions to an upstream
//! OpenAI-compatible endpoint (typically a LiteLLM proxy).
//!
//! ## Overview
//!
//! The interesting part is the protocol engine around the HTTP call:
//!
//! - **Framing**: one JSON-RPC frame per line; a malformed line gets a parse error and
//!   reading continues
//! - **Concurrency**: every frame is dispatched on its own task, bounded by
//!   `max_concurrent_requests`; responses go through a single exclusive writer
//! - **Validation**: unknown models never reach the upstream; out-of-range sampling
//!   parameters are rejected, not clamped
//! - **Upstream client**: one pooled `reqwest` client with connect/request timeouts,
//!   bounded exponential backoff, `Retry-After` support and SSE aggregation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use llm_relay::client::CompletionClient;
//! use llm_relay::config::ServerConfig;
//! use llm_relay::mcp::{Dispatcher, McpServer, ToolRegistry};
//! use llm_relay::models::ModelValidator;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> llm_relay::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let client = CompletionClient::new(&config)?;
//!     let registry = ToolRegistry::standard(Arc::new(client), ModelValidator::default())?;
//!     let server = McpServer::new(Dispatcher::new(registry), &config);
//!     server.run_stdio(CancellationToken::new()).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`mcp`] | Transport, dispatcher, tool registry and the two tools |
//! | [`client`] | Completion proxy client (pooling, retry, streaming) |
//! | [`models`] | Model allow-list and sampling parameter validation |
//! | [`pipeline`] | SSE decoding and chunk accumulation |
//! | [`transport`] | Pooled HTTP transport |
//! | [`config`] | Process-wide configuration |
//! | [`types`] | Messages, completion requests and results |

pub mod client;
pub mod config;
pub mod mcp;
pub mod models;
pub mod pipeline;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{CompletionBackend, CompletionClient, CompletionClientBuilder};
pub use config::ServerConfig;
pub use types::{
    completion::{CompletionRequest, CompletionResult, FinishReason},
    message::{Message, MessageRole},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
