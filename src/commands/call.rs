use anyhow::Result;
use serde_json::json;

use calc_mcp::Registry;

/// Run one tool in-process and print the same text tools/call would return
pub fn execute(tool: &str, a: f64, b: f64) -> Result<()> {
    let text = Registry::new().execute(tool, &json!({ "a": a, "b": b }));
    println!("{}", text);
    Ok(())
}
