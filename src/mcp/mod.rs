//! MCP 工具服务：基于 stdio 的 JSON-RPC 协议引擎
//!
//! MCP (Model Context Protocol) tool server over a newline-delimited JSON-RPC stream.
//!
//! This module handles:
//! - Frame reading and exclusive, whole-frame response writing ([`server`])
//! - Method routing and the error-to-response mapping ([`dispatcher`])
//! - The static tool table ([`registry`]) and the two tools ([`tools`])
//!
//! Protocol-level errors (`error` object) are reserved for frames that could not be
//! executed at all: malformed input, unknown methods or tools, invalid arguments.
//! Everything that happens after a tool started running is reported as tool content.

pub mod dispatcher;
pub mod registry;
pub mod server;
pub mod tools;
pub mod types;

pub use dispatcher::Dispatcher;
pub use registry::{ToolHandler, ToolRegistry};
pub use server::{FrameWriter, McpServer};
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolDescriptor, ToolResult};
