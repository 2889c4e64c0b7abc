use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, RoundtableError};

/// A named callable an agent may invoke. `parameters` is a JSON Schema
/// describing the argument object; `None` means anything goes.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, input: Value) -> Result<Value>;
}

/// The schema handed to the completion client so the model can request a
/// tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

/// Tool set owned by a single agent. Dispatch is routing + validation +
/// error capture only; side effects belong to the tools themselves.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Locate a tool by exact name, validate the arguments against its
    /// declared schema, and invoke it. Every failure mode comes back as an
    /// error value — unknown name, bad arguments, or the tool's own failure —
    /// so callers can fold it into a structured tool result instead of
    /// losing the turn.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RoundtableError::UnknownTool(name.to_string()))?;

        if let Some(schema) = tool.parameters() {
            validate_arguments(&arguments, &schema).map_err(|reason| {
                RoundtableError::InvalidArguments {
                    tool: name.to_string(),
                    reason,
                }
            })?;
        }

        tool.call(arguments)
            .await
            .map_err(|source| RoundtableError::ToolExecution {
                name: name.to_string(),
                source: Box::new(source),
            })
    }
}

/// Top-level JSON Schema validation: object-type check, required-field
/// presence, and declared property types. Returns the first violation found.
pub fn validate_arguments(args: &Value, schema: &Value) -> std::result::Result<(), String> {
    if let Some(schema_type) = schema.get("type").and_then(Value::as_str) {
        if schema_type == "object" && !args.is_object() {
            return Err(format!(
                "expected object arguments, got {}",
                json_type_name(args)
            ));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        let Some(obj) = args.as_object() else {
            return Ok(());
        };
        for field in required {
            if let Some(name) = field.as_str() {
                if !obj.contains_key(name) {
                    return Err(format!("missing required field `{name}`"));
                }
            }
        }
    }

    if let (Some(properties), Some(obj)) = (
        schema.get("properties").and_then(Value::as_object),
        args.as_object(),
    ) {
        for (key, value) in obj {
            let Some(expected) = properties
                .get(key)
                .and_then(|prop| prop.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !value_matches_type(value, expected) {
                return Err(format!(
                    "field `{key}` expected type `{expected}`, got {}",
                    json_type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
