//! Tool registry
//!
//! The catalog is fixed at construction: four binary arithmetic operations
//! over `a` and `b`. Failures inside a tool come back as text, not as
//! protocol errors.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{DispatchError, ToolError};

/// Tool definition returned by tools/list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Content block in a tools/call result
#[derive(Debug, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: &'static str,
    pub text: String,
}

/// Result body of tools/call
#[derive(Debug, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
}

impl ToolResult {
    pub fn text(msg: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text",
                text: msg.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    /// Registration order, also the tools/list order.
    /// Grouped as add/subtract then multiply/divide, not the historical
    /// add, multiply, subtract, divide listing.
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    fn description(self) -> &'static str {
        match self {
            Operation::Add => "Add two numbers together",
            Operation::Subtract => "Subtract second number from first",
            Operation::Multiply => "Multiply two numbers",
            Operation::Divide => "Divide first number by second",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Operation::Add => "Adding",
            Operation::Subtract => "Subtracting",
            Operation::Multiply => "Multiplying",
            Operation::Divide => "Dividing",
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Operation::Add => '+',
            Operation::Subtract => '-',
            Operation::Multiply => '×',
            Operation::Divide => '÷',
        }
    }

    pub fn apply(self, a: f64, b: f64) -> Result<f64, ToolError> {
        match self {
            Operation::Add => Ok(a + b),
            Operation::Subtract => Ok(a - b),
            Operation::Multiply => Ok(a * b),
            Operation::Divide if b == 0.0 => Err(ToolError::DivideByZero),
            Operation::Divide => Ok(a / b),
        }
    }

    fn descriptor(self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name(),
            description: self.description(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "a": { "type": "number", "description": "First number" },
                    "b": { "type": "number", "description": "Second number" }
                },
                "required": ["a", "b"]
            }),
        }
    }
}

/// A single tools/call, consumed as soon as it is executed
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    /// Build from tools/call params.
    ///
    /// Only a non-object `params` is a protocol failure; a bad `name` or
    /// `arguments` surfaces later as tool-level text.
    pub fn from_params(params: &Value) -> Result<Self, DispatchError> {
        let params = match params {
            Value::Null => return Ok(Self::unnamed()),
            Value::Object(map) => map,
            other => {
                return Err(DispatchError::Internal(format!(
                    "params must be an object, got {}",
                    json_type(other)
                )))
            }
        };

        let name = match params.get("name") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => Value::Null.to_string(),
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        Ok(Self { name, arguments })
    }

    fn unnamed() -> Self {
        Self {
            name: Value::Null.to_string(),
            arguments: Value::Null,
        }
    }
}

/// Immutable name → operation catalog
#[derive(Debug, Clone)]
pub struct Registry {
    tools: Vec<(ToolDescriptor, Operation)>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tools: Operation::ALL
                .into_iter()
                .map(|op| (op.descriptor(), op))
                .collect(),
        }
    }

    /// All descriptors in registration order
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|(desc, _)| desc).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<Operation> {
        self.tools
            .iter()
            .find(|(desc, _)| desc.name == name)
            .map(|(_, op)| *op)
    }

    /// Run a tool and render its outcome as text, failures included
    pub fn execute(&self, name: &str, args: &Value) -> String {
        match self.try_execute(name, args) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("tool '{}' failed: {}", name, e);
                e.to_string()
            }
        }
    }

    pub fn try_execute(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let op = self
            .lookup(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let empty = Map::new();
        let args = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => return Err(ToolError::ArgumentsNotObject(json_type(other))),
        };

        let a = coerce_number(args, "a")?;
        let b = coerce_number(args, "b")?;
        let result = op.apply(a, b)?;

        Ok(format!(
            "{} {} {} {} = {}",
            op.verb(),
            format_number(a),
            op.symbol(),
            format_number(b),
            format_number(result)
        ))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Missing arguments count as zero
fn coerce_number(args: &Map<String, Value>, name: &'static str) -> Result<f64, ToolError> {
    let invalid = |value: &Value| ToolError::InvalidNumber {
        name,
        value: value.to_string(),
    };

    match args.get(name) {
        None => Ok(0.0),
        // Literals beyond f64 range (1e400) saturate to infinity
        Some(Value::Number(n)) => n
            .as_f64()
            .or_else(|| n.to_string().parse::<f64>().ok())
            .ok_or_else(|| invalid(&Value::Number(n.clone()))),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(&Value::String(s.clone()))),
        Some(other) => Err(invalid(other)),
    }
}

/// Shortest round-trip form; integral values keep a trailing `.0`
fn format_number(n: f64) -> String {
    format!("{:?}", n)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
