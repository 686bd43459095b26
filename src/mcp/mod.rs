//! MCP (Model Context Protocol) server
//!
//! JSON-RPC 2.0 over stdio. No external SDK - blocking I/O, minimal dependencies.

pub mod protocol;
mod server;
pub mod tools;

pub use server::{run_mcp_server, serve, Dispatcher, ServeStats};
pub use tools::{Registry, ToolDescriptor, ToolInvocation};
