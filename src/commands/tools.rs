use anyhow::Result;

use calc_mcp::Registry;

pub fn execute(json: bool) -> Result<()> {
    let registry = Registry::new();
    let tools = registry.list();

    if json {
        let result = serde_json::json!({ "tools": tools });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Tools available: {}", tools.len());
    for tool in tools {
        let required = tool.input_schema["required"]
            .as_array()
            .map(|r| {
                r.iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        println!("  - {}({}): {}", tool.name, required, tool.description);
    }
    Ok(())
}
