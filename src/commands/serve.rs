use anyhow::Result;

use calc_mcp::{mcp, Config};

/// Serve JSON-RPC on stdin/stdout until stdin closes
pub fn execute(config: &Config) -> Result<()> {
    mcp::run_mcp_server(config)
}
