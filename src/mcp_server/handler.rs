//! Tool handler seam.
//!
//! Concrete tools implement [`Tool`] with a typed argument struct. The
//! registry stores them behind the object-safe [`ToolHandler`], which takes
//! raw JSON and maps failures onto [`ErrorDetail`] kinds.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{ErrorDetail, ErrorKind, InputSchema};

/// A tool's own logic failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Type-erased handler stored in the registry.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool on schema-valid arguments.
    async fn handle(&self, arguments: Value) -> Result<Value, ErrorDetail>;
}

/// A concrete, strongly-typed tool.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send;

    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> InputSchema;

    async fn call(&self, args: Self::Args) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<T: Tool> ToolHandler for T {
    async fn handle(&self, arguments: Value) -> Result<Value, ErrorDetail> {
        let arguments = if arguments.is_null() {
            Value::Object(Default::default())
        } else {
            arguments
        };
        let args: T::Args = serde_json::from_value(arguments)
            .map_err(|e| ErrorDetail::new(ErrorKind::InvalidArguments, e.to_string()))?;
        self.call(args)
            .await
            .map_err(|e| ErrorDetail::new(ErrorKind::HandlerError, e.message))
    }
}
