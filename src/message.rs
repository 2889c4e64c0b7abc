use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversational role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// The outcome of a tool invocation. Errors travel the same path as
/// successes so the model can react to them on its next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

/// One immutable unit of conversational content. `source` names the agent
/// (or "user") that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            source: "system".into(),
            tool_call: None,
            tool_result: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            source: "user".into(),
            tool_call: None,
            tool_result: None,
        }
    }

    pub fn assistant(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            source: source.into(),
            tool_call: None,
            tool_result: None,
        }
    }

    /// An assistant message carrying a pending tool call.
    pub fn tool_call(source: impl Into<String>, call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: format!("Calling tool `{}`", call.name),
            source: source.into(),
            tool_call: Some(call),
            tool_result: None,
        }
    }

    pub fn tool_result(source: impl Into<String>, result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: render_value(&result.content),
            source: source.into(),
            tool_call: None,
            tool_result: Some(result),
        }
    }
}

/// Render a JSON value the way it should read in message content: bare
/// strings without quotes, everything else as compact JSON.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_result_renders_bare_values() {
        let result = ToolResult {
            name: "calculator".into(),
            tool_call_id: None,
            content: json!(7),
            is_error: false,
        };
        let message = Message::tool_result("assistant", result);
        assert_eq!(message.content, "7");
        assert_eq!(message.role, Role::Tool);
    }

    #[test]
    fn string_results_are_unquoted() {
        let result = ToolResult {
            name: "current_time".into(),
            tool_call_id: None,
            content: json!("12:00:00"),
            is_error: false,
        };
        assert_eq!(Message::tool_result("assistant", result).content, "12:00:00");
    }

    #[test]
    fn serializes_without_empty_fields() {
        let message = Message::user("hello");
        let raw = serde_json::to_string(&message).unwrap();
        assert!(!raw.contains("tool_call"));
        assert!(raw.contains("\"role\":\"user\""));
    }
}
