//! Tool registry: a static name → {descriptor, schema, handler} map built once at startup.
//!
//! Each descriptor's `inputSchema` is compiled when the tool is registered, and the same
//! compiled schema gates every call, so what `tools/list` advertises is what is enforced.

use async_trait::async_trait;
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema, ValidationError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::CompletionBackend;
use crate::models::ModelValidator;
use crate::{Error, ErrorContext, Result};

use super::tools::{CompleteTool, ListModelsTool};
use super::types::{ToolDescriptor, ToolResult};

/// A callable tool.
///
/// Arguments reaching [`ToolHandler::call`] already satisfy the descriptor's schema.
/// Return `Err(Error::Validation { .. })` for anything else the caller must fix; it becomes
/// an `invalid params` protocol error. Any other error is reported as tool-level failure
/// content.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn call(&self, arguments: Value) -> Result<ToolResult>;
}

#[derive(Clone)]
pub struct RegisteredTool {
    descriptor: ToolDescriptor,
    schema: Arc<JSONSchema>,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        self.handler.clone()
    }

    /// Check `arguments` against the compiled input schema.
    ///
    /// Only the first violation is reported; its location becomes the error's field path.
    pub fn validate(&self, arguments: &Value) -> Result<()> {
        let mut errors = match self.schema.validate(arguments) {
            Ok(()) => return Ok(()),
            Err(errors) => errors,
        };
        match errors.next() {
            Some(first) => Err(Error::validation_with_context(
                first.to_string(),
                ErrorContext::new()
                    .with_field_path(field_path(&first))
                    .with_source("tool_arguments"),
            )),
            None => Ok(()),
        }
    }
}

/// Render a violation's location as `messages[0].role`; the root is `arguments`.
fn field_path(error: &ValidationError<'_>) -> String {
    fn push_key(field: &mut String, key: &str) {
        if !field.is_empty() {
            field.push('.');
        }
        field.push_str(key);
    }

    let mut field = String::new();
    let pointer = error.instance_path.to_string();
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if segment.parse::<usize>().is_ok() {
            field.push_str(&format!("[{}]", segment));
        } else {
            push_key(&mut field, &segment);
        }
    }

    // A missing key is reported at its parent object.
    if let ValidationErrorKind::Required { property } = &error.kind {
        if let Some(name) = property.as_str() {
            push_key(&mut field, name);
        }
    }

    if field.is_empty() {
        "arguments".to_string()
    } else {
        field
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The two tools this server exposes: `complete` and `list_models`.
    pub fn standard(backend: Arc<dyn CompletionBackend>, validator: ModelValidator) -> Result<Self> {
        Self::new()
            .with_tool(Arc::new(CompleteTool::new(backend, validator)))?
            .with_tool(Arc::new(ListModelsTool::new(validator)))
    }

    /// Register a tool, compiling its input schema.
    pub fn with_tool(mut self, handler: Arc<dyn ToolHandler>) -> Result<Self> {
        let descriptor = handler.descriptor();
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&descriptor.input_schema)
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid input schema for tool '{}': {}", descriptor.name, e),
                    ErrorContext::new()
                        .with_field_path(descriptor.name)
                        .with_source("tool_registry"),
                )
            })?;

        self.tools.insert(
            descriptor.name,
            RegisteredTool {
                descriptor,
                schema: Arc::new(schema),
                handler,
            },
        );
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor.clone()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }
}
