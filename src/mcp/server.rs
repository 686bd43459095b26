//! MCP server - stdio transport
//!
//! One JSON value per line in, at most one response line out, strictly in
//! order. The loop only ends at end-of-stream or when the output side breaks.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use super::protocol::{Request, Response};
use super::tools::{Registry, ToolInvocation, ToolResult};
use crate::config::{Config, ServerConfig};
use crate::error::DispatchError;

/// Counters reported when the input stream closes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: usize,
    pub notifications: usize,
    pub parse_errors: usize,
}

/// Routes requests to protocol handlers and the tool registry.
/// Holds no state that changes between requests.
pub struct Dispatcher {
    registry: Registry,
    server: ServerConfig,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: Registry::new(),
            server: config.server.clone(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse, classify and dispatch one record.
    ///
    /// Returns `None` for notifications, which get no reply.
    pub fn handle_line(&self, line: &str) -> Option<Response> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("unparsable request line: {}", e);
                return Some(Response::error(Value::Null, &DispatchError::Parse));
            }
        };

        // Recover the id before the request shape is checked
        let fallback_id = value.get("id").cloned().unwrap_or(Value::Null);

        let request: Request = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("malformed request: {}", e);
                return Some(Response::error(
                    fallback_id,
                    &DispatchError::Internal(e.to_string()),
                ));
            }
        };

        if !request.declares_version() {
            tracing::debug!("request declares jsonrpc {:?}", request.jsonrpc);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&request)));
        let response = match outcome {
            Ok(response) => response,
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                tracing::error!("handler for '{}' panicked: {}", request.method, detail);
                Response::error(request.response_id(), &DispatchError::Internal(detail))
            }
        };

        if request.is_notification() {
            tracing::debug!("notification '{}' handled, no reply", request.method);
            return None;
        }
        Some(response)
    }

    pub fn dispatch(&self, req: &Request) -> Response {
        let id = req.response_id();
        let result = match req.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "tools/list" => Ok(self.handle_list_tools()),
            "tools/call" => self.handle_tool_call(&req.params),
            other => Err(DispatchError::MethodNotFound(other.to_string())),
        };

        match result {
            Ok(value) => Response::success(id, value),
            Err(e) => {
                tracing::debug!("{} -> {}", req.method, e);
                Response::error(id, &e)
            }
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": self.server.protocol_version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": self.server.name,
                "version": self.server.version
            }
        })
    }

    fn handle_list_tools(&self) -> Value {
        json!({ "tools": self.registry.list() })
    }

    fn handle_tool_call(&self, params: &Value) -> Result<Value, DispatchError> {
        let invocation = ToolInvocation::from_params(params)?;
        tracing::info!("tools/call {} {}", invocation.name, invocation.arguments);

        let text = self
            .registry
            .execute(&invocation.name, &invocation.arguments);

        serde_json::to_value(ToolResult::text(text))
            .map_err(|e| DispatchError::Internal(e.to_string()))
    }
}

/// Run the read → dispatch → write loop until `reader` hits end-of-stream
pub fn serve<R: BufRead, W: Write>(
    dispatcher: &Dispatcher,
    mut reader: R,
    mut writer: W,
) -> Result<ServeStats> {
    let mut stats = ServeStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Failed to read from input stream")?;
        if read == 0 {
            break;
        }

        // Invalid UTF-8 becomes replacement chars and then a parse error
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tracing::trace!("<- {}", line);

        let Some(response) = dispatcher.handle_line(line) else {
            stats.notifications += 1;
            continue;
        };

        if response
            .error
            .as_ref()
            .is_some_and(|e| e.code == super::protocol::PARSE_ERROR)
        {
            stats.parse_errors += 1;
        } else {
            stats.requests += 1;
        }

        write_response(&mut writer, &response)?;
    }

    Ok(stats)
}

fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let line = serde_json::to_string(response).context("Failed to serialize response")?;
    tracing::trace!("-> {}", line);
    writeln!(writer, "{}", line).context("Failed to write response")?;
    writer.flush().context("Failed to flush response")?;
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Run MCP server over stdio
pub fn run_mcp_server(config: &Config) -> Result<()> {
    let dispatcher = Dispatcher::new(config);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    tracing::info!(
        "{} v{} ready (protocol {}, {} tools)",
        config.server.name,
        config.server.version,
        config.server.protocol_version,
        dispatcher.registry().list().len()
    );

    let stats = serve(&dispatcher, stdin.lock(), stdout.lock())?;

    tracing::info!(
        "input closed: {} requests, {} notifications, {} parse errors",
        stats.requests,
        stats.notifications,
        stats.parse_errors
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&Config::default())
    }

    fn reply(line: &str) -> Value {
        let resp = dispatcher().handle_line(line).expect("expected a response");
        serde_json::to_value(resp).unwrap()
    }

    #[test]
    fn test_initialize() {
        let v = reply(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#);
        assert_eq!(v["id"], json!(0));
        assert_eq!(v["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(v["result"]["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(v["result"]["serverInfo"]["name"], "calculator-server");
        assert!(v.get("error").is_none());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let first = reply(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#);
        let second = reply(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#);
        assert_eq!(first, second);
    }

    #[test]
    fn test_initialize_uses_configured_identity() {
        let config = Config::load_from_str("[server]\nname = \"math\"\nversion = \"2.0.0\"").unwrap();
        let resp = Dispatcher::new(&config)
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .unwrap();
        let v = serde_json::to_value(resp).unwrap();
        assert_eq!(v["result"]["serverInfo"], json!({"name": "math", "version": "2.0.0"}));
    }

    #[test]
    fn test_tools_list() {
        let v = reply(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#);
        let names: Vec<_> = v["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["add", "subtract", "multiply", "divide"]);
        assert!(v["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[test]
    fn test_tools_call_divide_by_zero() {
        let v = reply(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"divide","arguments":{"a":10,"b":0}}}"#);
        assert_eq!(
            v,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "result": {"content": [{"type": "text", "text": "Error: Cannot divide by zero"}]}
            })
        );
    }

    #[test]
    fn test_tools_call_add() {
        let v = reply(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":15,"b":7}}}"#);
        let text = v["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("15.0 + 7.0 = 22.0"), "{text}");
    }

    #[test]
    fn test_tools_call_unknown_tool_is_success() {
        let v = reply(r#"{"jsonrpc":"2.0","id":"x","method":"tools/call","params":{"name":"sqrt","arguments":{}}}"#);
        assert_eq!(v["id"], "x");
        assert!(v.get("error").is_none());
        assert_eq!(v["result"]["content"][0]["text"], "Error: Unknown tool 'sqrt'");
    }

    #[test]
    fn test_tools_call_bad_params_is_internal_error() {
        let v = reply(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":[1,2]}"#);
        assert_eq!(v["id"], 4);
        assert_eq!(v["error"]["code"], -32603);
        assert!(v["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Internal error: "));
        assert!(v.get("result").is_none());
    }

    #[test]
    fn test_unknown_method() {
        let v = reply(r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#);
        assert_eq!(v["error"]["code"], -32601);
        assert_eq!(v["error"]["message"], "Method not found: resources/list");
    }

    #[test]
    fn test_parse_error() {
        let v = reply("not-json");
        assert_eq!(
            v,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}})
        );
    }

    #[test]
    fn test_non_object_request_is_internal_error() {
        let v = reply("[1,2,3]");
        assert_eq!(v["id"], Value::Null);
        assert_eq!(v["error"]["code"], -32603);
    }

    #[test]
    fn test_missing_method_echoes_id() {
        let v = reply(r#"{"jsonrpc":"2.0","id":11}"#);
        assert_eq!(v["id"], 11);
        assert_eq!(v["error"]["code"], -32603);
    }

    #[test]
    fn test_notifications_get_no_reply() {
        let d = dispatcher();
        assert!(d
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .is_none());
        assert!(d
            .handle_line(r#"{"jsonrpc":"2.0","method":"tools/list"}"#)
            .is_none());
    }

    #[test]
    fn test_id_echoed_with_type() {
        let v = reply(r#"{"jsonrpc":"2.0","id":"7","method":"tools/list"}"#);
        assert_eq!(v["id"], json!("7"));
        let v = reply(r#"{"jsonrpc":"2.0","id":7.5,"method":"tools/list"}"#);
        assert_eq!(v["id"], json!(7.5));
        let v = reply(r#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#);
        assert_eq!(v["id"], Value::Null);
        assert!(v.get("result").is_some());
    }

    #[test]
    fn test_large_integer_id_echoed_exactly() {
        let resp = dispatcher()
            .handle_line(r#"{"jsonrpc":"2.0","id":123456789012345678901234567890,"method":"tools/list"}"#)
            .unwrap();
        let out = serde_json::to_string(&resp).unwrap();
        assert!(
            out.starts_with(r#"{"jsonrpc":"2.0","id":123456789012345678901234567890,"result":"#),
            "{out}"
        );

        let resp = dispatcher()
            .handle_line(r#"{"jsonrpc":"2.0","id":-98765432109876543210987654321,"method":"bogus"}"#)
            .unwrap();
        let out = serde_json::to_string(&resp).unwrap();
        assert!(out.contains(r#""id":-98765432109876543210987654321,"#), "{out}");
    }

    #[test]
    fn test_non_string_jsonrpc_still_dispatched() {
        let v = reply(r#"{"jsonrpc":2,"id":1,"method":"tools/list"}"#);
        assert_eq!(v["id"], 1);
        assert!(v.get("error").is_none(), "{v}");
        assert_eq!(v["result"]["tools"].as_array().unwrap().len(), 4);

        let v = reply(r#"{"jsonrpc":null,"id":2,"method":"initialize"}"#);
        assert!(v.get("result").is_some(), "{v}");
    }

    #[test]
    fn test_out_of_range_number_reaches_tool() {
        let v = reply(r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"add","arguments":{"a":1e400,"b":1}}}"#);
        assert!(v.get("error").is_none(), "{v}");
        assert_eq!(v["result"]["content"][0]["text"], "Adding inf + 1.0 = inf");
    }

    #[test]
    fn test_serve_loop_recovers_and_counts() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n",
            "\n",
            "   \n",
            "not-json\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}"
        );
        let mut out = Vec::new();
        let stats = serve(&dispatcher(), input.as_bytes(), &mut out).unwrap();

        assert_eq!(
            stats,
            ServeStats {
                requests: 2,
                notifications: 1,
                parse_errors: 1
            }
        );

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert_eq!(lines[2]["id"], 2);
    }

    #[test]
    fn test_serve_invalid_utf8_is_parse_error() {
        let input: &[u8] = b"\xff\xfe{}\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n";
        let mut out = Vec::new();
        let stats = serve(&dispatcher(), input, &mut out).unwrap();
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.requests, 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "handler panicked");
    }
}
