//! MCP tool definitions and handlers
//!
//! `complete` proxies one chat completion upstream; `list_models` renders the allow-list.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::client::CompletionBackend;
use crate::models::{ModelValidator, MAX_TEMPERATURE, MIN_TEMPERATURE};
use crate::types::{CompletionRequest, Message};
use crate::{Error, ErrorContext, Result};

use super::registry::ToolHandler;
use super::types::{ToolDescriptor, ToolResult};

/// `complete` arguments. The registry has already checked them against the input schema.
#[derive(Debug, Deserialize)]
struct CompleteArgs {
    model: String,
    messages: Vec<Message>,
    #[serde(default)]
    temperature: Option<f64>,
    /// The schema admits integral floats such as `5.0`, so this is read as a number.
    #[serde(default)]
    max_tokens: Option<f64>,
    #[serde(default)]
    stream: bool,
}

impl CompleteArgs {
    fn parse(arguments: Value) -> Result<Self> {
        serde_json::from_value(arguments).map_err(|e| {
            Error::validation_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_field_path("arguments")
                    .with_source("tool_arguments"),
            )
        })
    }

    /// Saturates out-of-range values so the `u32` narrowing reports them.
    fn max_tokens(&self) -> Option<i64> {
        self.max_tokens.map(|n| n as i64)
    }
}

pub struct CompleteTool {
    backend: Arc<dyn CompletionBackend>,
    validator: ModelValidator,
}

impl CompleteTool {
    pub fn new(backend: Arc<dyn CompletionBackend>, validator: ModelValidator) -> Self {
        Self { backend, validator }
    }
}

#[async_trait]
impl ToolHandler for CompleteTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "complete",
            description: "Send a completion request to a specified LLM model through the LiteLLM proxy.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {
                        "type": "string",
                        "description": format!(
                            "The LLM model to use. Supported models: {}",
                            self.validator.allowed_ids().join(", ")
                        )
                    },
                    "messages": {
                        "type": "array",
                        "description": "An array of conversation messages, each with 'role' and 'content'.",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "role": {
                                    "type": "string",
                                    "enum": ["system", "user", "assistant", "tool"],
                                    "description": "The role in the conversation."
                                },
                                "content": {
                                    "type": "string",
                                    "description": "The content of the message."
                                }
                            },
                            "required": ["role", "content"]
                        }
                    },
                    "temperature": {
                        "type": "number",
                        "description": "Controls randomness in the response (0.0 to 2.0).",
                        "minimum": MIN_TEMPERATURE,
                        "maximum": MAX_TEMPERATURE,
                        "default": crate::types::DEFAULT_TEMPERATURE
                    },
                    "max_tokens": {
                        "type": "integer",
                        "description": "Maximum number of tokens to generate.",
                        "minimum": 1,
                        "default": crate::types::DEFAULT_MAX_TOKENS
                    },
                    "stream": {
                        "type": "boolean",
                        "description": "Stream from upstream; the reply is still delivered as one result.",
                        "default": false
                    }
                },
                "required": ["model", "messages"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult> {
        let args = CompleteArgs::parse(arguments)?;

        // Range errors are reported even for an unknown model.
        let profile = self.validator.validate_model(&args.model);
        let sampling = self.validator.validate_sampling(
            profile.as_ref().ok().copied(),
            args.temperature,
            args.max_tokens(),
        )?;
        let profile = match profile {
            Ok(p) => p,
            Err(e) => {
                debug!(model = args.model.as_str(), "rejected model outside allow-list");
                let message = match &e {
                    Error::Validation { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                return Ok(ToolResult::error(message));
            }
        };

        debug!(
            model = profile.id,
            messages = args.messages.len(),
            temperature = sampling.temperature,
            max_tokens = sampling.max_tokens,
            stream = args.stream,
            "forwarding completion"
        );

        let mut request = CompletionRequest::new(profile.id, args.messages)
            .temperature(sampling.temperature)
            .max_tokens(sampling.max_tokens)
            .stream(args.stream);
        if let Some(timeout) = profile.request_timeout {
            request = request.timeout(timeout);
        }
        let result = self.backend.complete(request).await;

        let mut meta = json!({
            "model": profile.id,
            "finish_reason": result.finish_reason.as_str(),
        });
        if let Some(usage) = result.usage {
            meta["usage"] = serde_json::to_value(usage)?;
        }

        let tool_result = if result.is_error() {
            ToolResult::error(result.text)
        } else {
            ToolResult::text(result.text)
        };
        Ok(tool_result.with_meta(meta))
    }
}

pub struct ListModelsTool {
    validator: ModelValidator,
}

impl ListModelsTool {
    pub fn new(validator: ModelValidator) -> Self {
        Self { validator }
    }

    fn render(&self) -> String {
        let mut out = String::from("Available models in this MCP server:\n");
        for model in self.validator.models() {
            out.push_str(&format!("- {}: {}\n", model.id, model.description));
        }
        out.push_str("\nOnly these models are supported; requests for any other model are rejected.");
        out
    }
}

#[async_trait]
impl ToolHandler for ListModelsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "list_models",
            description: "List the models available through this server.",
            input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<ToolResult> {
        let ids = self.validator.allowed_ids();
        Ok(ToolResult::text(self.render()).with_meta(json!({ "models": ids })))
    }
}
