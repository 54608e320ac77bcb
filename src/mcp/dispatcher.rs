//! Per-frame dispatch: `Received → Routed → Executing → Completed | Failed`.
//!
//! The dispatcher turns one decoded request into at most one response. It never panics
//! outward: handler panics and unexpected handler errors become tool-level failure content.

use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

use crate::Error;

use super::registry::ToolRegistry;
use super::types::{
    JsonRpcRequest, JsonRpcResponse, ToolCallParams, ToolResult, INVALID_PARAMS, METHOD_NOT_FOUND,
};

pub const SERVER_NAME: &str = "llm-relay";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Clone)]
pub struct Dispatcher {
    registry: ToolRegistry,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one request. Returns `None` for notifications.
    pub async fn dispatch(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let notification = req.is_notification();
        let id = req.id.clone().unwrap_or(Value::Null);
        debug!(method = req.method.as_str(), id = %id, "received");

        // Nobody would see the result, so don't spend an upstream call on it.
        if notification && req.method == "tools/call" {
            debug!("tools/call sent as a notification; not executed");
            return None;
        }

        let response = match req.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                debug!(id = %id, "routed to tools/list");
                JsonRpcResponse::success(id, json!({ "tools": self.registry.descriptors() }))
            }
            "tools/call" => self.call_tool(id, req.params).await,
            // Notifications (`notifications/initialized`, `notifications/cancelled`, ...) are
            // accepted silently below; only requests learn that a method is unknown.
            other => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };

        if notification {
            debug!(method = req.method.as_str(), "notification consumed");
            return None;
        }
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Value) -> JsonRpcResponse {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                debug!(id = %id, error = %e, "failed: malformed tools/call params");
                return JsonRpcResponse::error_with_data(
                    id,
                    INVALID_PARAMS,
                    format!("Invalid params: {}", e),
                    Some(json!({ "field": "params" })),
                );
            }
        };

        let Some(tool) = self.registry.get(&params.name) else {
            debug!(id = %id, tool = params.name.as_str(), "failed: unknown tool");
            return JsonRpcResponse::error_with_data(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown tool: {}", params.name),
                Some(json!({ "available": self.registry.names() })),
            );
        };

        debug!(id = %id, tool = params.name.as_str(), "routed");

        // Omitted arguments are an empty object.
        let arguments = if params.arguments.is_null() {
            json!({})
        } else {
            params.arguments
        };
        if let Err(Error::Validation { message, context }) = tool.validate(&arguments) {
            debug!(id = %id, tool = params.name.as_str(), error = message.as_str(), "failed: arguments do not match schema");
            return invalid_params(id, message, context.field_path);
        }

        debug!(id = %id, tool = params.name.as_str(), "executing");

        let outcome = AssertUnwindSafe(tool.handler().call(arguments))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => {
                debug!(
                    id = %id,
                    tool = params.name.as_str(),
                    is_error = result.is_error,
                    "completed"
                );
                result
            }
            Ok(Err(Error::Validation { message, context })) => {
                debug!(id = %id, tool = params.name.as_str(), error = message.as_str(), "failed: invalid arguments");
                return invalid_params(id, message, context.field_path);
            }
            Ok(Err(e)) => {
                error!(id = %id, tool = params.name.as_str(), error = %e, "tool handler failed");
                ToolResult::error(format!("Internal error: {}", e))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(id = %id, tool = params.name.as_str(), panic = reason.as_str(), "tool handler panicked");
                ToolResult::error(format!("Internal error: {}", reason))
            }
        };

        match serde_json::to_value(&result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                error!(id = %id, error = %e, "failed to serialize tool result");
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": "Internal error: result serialization failed" }],
                        "isError": true
                    }),
                )
            }
        }
    }
}

fn invalid_params(id: Value, message: String, field: Option<String>) -> JsonRpcResponse {
    let text = match &field {
        Some(f) => format!("Invalid params: {} (field: {})", message, f),
        None => format!("Invalid params: {}", message),
    };
    JsonRpcResponse::error_with_data(id, INVALID_PARAMS, text, field.map(|f| json!({ "field": f })))
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
