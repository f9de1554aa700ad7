//! Tool discovery: fetch and validate the host's catalog.
//!
//! Validation is all-or-nothing. A single bad descriptor (missing name,
//! duplicate name, malformed schema) fails the whole catalog so that no
//! unvalidated tool ever becomes callable.

use std::collections::HashSet;

use serde_json::Value;

use super::catalog::Catalog;
use super::errors::McpError;
use super::transport::Session;
use crate::protocol::types::methods;
use crate::protocol::{InputSchema, ToolDescriptor};

/// Fetch the current catalog. Read-only on the host.
pub async fn list_tools(session: &Session) -> Result<Catalog, McpError> {
    let result = session.request(methods::TOOLS_LIST, None).await?;
    let catalog = parse_catalog(result)?;
    tracing::info!(
        endpoint = %session.label(),
        tool_count = catalog.len(),
        tools = ?catalog.names(),
        "discovered tools"
    );
    Ok(catalog)
}

/// Validate a raw `tools/list` result.
pub fn parse_catalog(result: Value) -> Result<Catalog, McpError> {
    let entries = match result.get("tools") {
        Some(Value::Array(entries)) => entries,
        _ => return Err(discovery("result has no 'tools' array")),
    };

    let mut seen = HashSet::new();
    let mut tools = Vec::with_capacity(entries.len());

    for (i, entry) in entries.iter().enumerate() {
        let obj = entry
            .as_object()
            .ok_or_else(|| discovery(format!("tool #{i} is not an object")))?;

        let name = match obj.get("name").and_then(Value::as_str) {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => return Err(discovery(format!("tool #{i} has no name"))),
        };

        if !seen.insert(name.clone()) {
            return Err(discovery(format!("duplicate tool name '{name}'")));
        }

        let description = match obj.get("description") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(discovery(format!(
                    "tool '{name}' has a non-string description"
                )))
            }
        };

        let raw_schema = obj
            .get("inputSchema")
            .ok_or_else(|| discovery(format!("tool '{name}' has no inputSchema")))?;
        let input_schema = InputSchema::from_json_schema(raw_schema)
            .map_err(|e| discovery(format!("tool '{name}': {e}")))?;

        tools.push(ToolDescriptor {
            name,
            description,
            input_schema,
        });
    }

    Ok(Catalog::from_unique(tools))
}

fn discovery(reason: impl Into<String>) -> McpError {
    McpError::Discovery {
        reason: reason.into(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
