//! Host-side tool registry.
//!
//! Maps tool name → descriptor + handler. Dispatch is a lookup followed by
//! schema validation; the handler only ever sees schema-valid arguments.
//! Each invocation runs on its own task so a panicking handler is reported
//! as a `HandlerError` instead of taking the connection down.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::handler::{Tool, ToolHandler};
use crate::protocol::{ErrorDetail, ErrorKind, InputSchema, ToolDescriptor};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{name}' is already registered")]
    Duplicate { name: String },

    #[error("tool name must not be empty")]
    EmptyName,
}

struct Entry {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Ordered registry of tools. Read-only once serving starts.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool instance.
    pub fn register_arc<T: Tool>(&mut self, tool: Arc<T>) -> Result<(), RegistryError> {
        let descriptor = ToolDescriptor {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        };
        self.register_handler(descriptor, tool)
    }

    /// Register a type-erased handler under an explicit descriptor.
    pub fn register_handler(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate {
                name: descriptor.name,
            });
        }

        tracing::debug!(tool = %descriptor.name, "registered tool");
        self.index
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Entry {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub fn schema(&self, name: &str) -> Option<&InputSchema> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i].descriptor.input_schema)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate and run one tool call.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ErrorDetail> {
        let entry = self
            .index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| ErrorDetail::unknown_tool(name))?;

        entry
            .descriptor
            .input_schema
            .validate(&arguments)
            .map_err(|reason| ErrorDetail::new(ErrorKind::InvalidArguments, reason))?;

        let handler = Arc::clone(&entry.handler);
        let task = tokio::spawn(async move { handler.handle(arguments).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                tracing::error!(tool = name, "tool handler panicked");
                Err(ErrorDetail::new(
                    ErrorKind::HandlerError,
                    format!("tool '{name}' panicked"),
                ))
            }
            Err(e) => Err(ErrorDetail::new(
                ErrorKind::HandlerError,
                format!("tool '{name}' was cancelled: {e}"),
            )),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
