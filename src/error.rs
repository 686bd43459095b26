//! Error types for the calculator server
//!
//! Two taxonomies that never mix: `ToolError` is rendered into a successful
//! `tools/call` result, `DispatchError` becomes a JSON-RPC `error` object.

use thiserror::Error;

use crate::mcp::protocol::{INTERNAL_ERROR, METHOD_NOT_FOUND, PARSE_ERROR};

/// Tool-level failures. Reported as text content, never as a protocol error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Error: Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Error: Cannot divide by zero")]
    DivideByZero,

    #[error("Error executing tool: could not convert argument '{name}' to a number: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Error executing tool: arguments must be an object, got {0}")]
    ArgumentsNotObject(&'static str),
}

/// Protocol-level failures, one per JSON-RPC error code we emit
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("Parse error")]
    Parse,

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// JSON-RPC error code for this failure
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Parse => PARSE_ERROR,
            DispatchError::MethodNotFound(_) => METHOD_NOT_FOUND,
            DispatchError::Internal(_) => INTERNAL_ERROR,
        }
    }
}
