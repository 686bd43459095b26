//! Arithmetic tool server speaking JSON-RPC 2.0 over line-delimited stdio.

pub mod config;
pub mod error;
pub mod mcp;

// Re-export commonly used types
pub use config::Config;
pub use error::{DispatchError, ToolError};
pub use mcp::{Dispatcher, Registry};
