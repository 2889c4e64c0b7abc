//! Completion clients and the abstraction the rest of the runtime talks to.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ModelConfig;
use crate::error::{Result, RoundtableError};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolSchema;

/// Result of a single completion request: plain text, a batch of tool
/// calls, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolCall {
                id: None,
                name: name.into(),
                arguments,
            }],
        }
    }
}

/// Minimal abstraction around a chat completion provider. Both delivery
/// modes are supported; with `stream` set the client accumulates incremental
/// deltas and still returns one finished completion. Failures surface to the
/// caller unretried — retry policy belongs to the provider, not the runtime.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        stream: bool,
    ) -> Result<Completion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str) -> RoundtableError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return RoundtableError::Completion(format!("rate limit exceeded: {body}"));
    }
    RoundtableError::Completion(format!("request failed with {status}: {body}"))
}

/// How the endpoint URL and auth header are assembled.
#[derive(Debug, Clone, PartialEq)]
enum Addressing {
    /// `{base}/chat/completions` with a bearer token.
    OpenAi { base_url: String },
    /// Azure deployment routing: `{endpoint}/openai/deployments/{model}/
    /// chat/completions?api-version={v}` with an `api-key` header.
    Azure {
        endpoint: String,
        api_version: String,
    },
}

/// Client for the OpenAI chat-completions wire format, including Azure
/// deployment addressing.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    addressing: Addressing,
}

impl OpenAIClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            RoundtableError::Config("missing API key in model config".into())
        })?;
        let addressing = match cfg.provider.as_str() {
            "azure" => Addressing::Azure {
                endpoint: cfg
                    .endpoint
                    .clone()
                    .ok_or_else(|| {
                        RoundtableError::Config("azure provider requires an endpoint".into())
                    })?
                    .trim_end_matches('/')
                    .to_string(),
                api_version: cfg
                    .api_version
                    .clone()
                    .unwrap_or_else(|| "2024-06-01".to_string()),
            },
            _ => Addressing::OpenAi {
                base_url: cfg
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
        };
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|err| RoundtableError::Completion(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            addressing,
        })
    }

    fn request(&self, payload: &Value) -> reqwest::RequestBuilder {
        match &self.addressing {
            Addressing::OpenAi { base_url } => self
                .http
                .post(format!("{base_url}/chat/completions"))
                .header(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", self.api_key),
                )
                .json(payload),
            Addressing::Azure {
                endpoint,
                api_version,
            } => self
                .http
                .post(format!(
                    "{endpoint}/openai/deployments/{}/chat/completions?api-version={api_version}",
                    self.model
                ))
                .header("api-key", &self.api_key)
                .json(payload),
        }
    }

    fn to_wire_messages(&self, messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string();

                let tool_calls = message.tool_call.as_ref().map(|call| {
                    vec![WireToolCall {
                        id: call.id.clone(),
                        r#type: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: serde_json::to_string(&call.arguments)
                                .unwrap_or_else(|_| call.arguments.to_string()),
                        },
                    }]
                });

                let content = if message.role == Role::Tool {
                    message
                        .tool_result
                        .as_ref()
                        .map(|result| {
                            serde_json::to_string(&result.content)
                                .unwrap_or_else(|_| result.content.to_string())
                        })
                        .or_else(|| Some(message.content.clone()))
                } else {
                    Some(message.content.clone())
                };

                WireMessage {
                    role,
                    content,
                    tool_call_id: message
                        .tool_result
                        .as_ref()
                        .and_then(|result| result.tool_call_id.clone()),
                    tool_calls,
                }
            })
            .collect()
    }

    fn to_wire_tools(&self, tools: &[ToolSchema]) -> Option<Vec<WireTool>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|tool| WireTool {
                    r#type: "function".to_string(),
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: Some(tool.description.clone()),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        )
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        stream: bool,
    ) -> Result<Completion> {
        let payload = json!({
            "model": self.model,
            "messages": self.to_wire_messages(messages),
            "tools": self.to_wire_tools(tools),
            "tool_choice": if tools.is_empty() { Value::Null } else { Value::String("auto".into()) },
            "stream": stream,
        });

        let resp = self
            .request(&payload)
            .send()
            .await
            .map_err(|err| RoundtableError::Completion(format!("request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body));
        }

        if stream {
            let mut content = String::new();
            let mut tool_calls: HashMap<String, ToolCallState> = HashMap::new();
            let mut body = resp.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk
                    .map_err(|err| RoundtableError::Completion(format!("stream error: {err}")))?;
                let text = String::from_utf8_lossy(&chunk);
                for line in text.lines() {
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" || data.is_empty() {
                        continue;
                    }
                    let parsed: WireStreamChunk = serde_json::from_str(data).map_err(|err| {
                        RoundtableError::Completion(format!("stream parse error `{data}`: {err}"))
                    })?;
                    for choice in parsed.choices {
                        if let Some(delta) = choice.delta.content {
                            content.push_str(&delta);
                        }
                        for delta_call in choice.delta.tool_calls.unwrap_or_default() {
                            let id = delta_call
                                .id
                                .clone()
                                .unwrap_or_else(|| format!("call_{}", tool_calls.len()));
                            let state = tool_calls.entry(id.clone()).or_default();
                            state.id = Some(id);
                            if let Some(function) = delta_call.function {
                                if let Some(name) = function.name {
                                    state.name = Some(name);
                                }
                                if let Some(args) = function.arguments {
                                    state.arguments.push_str(&args);
                                }
                            }
                        }
                    }
                }
            }

            let calls = tool_calls
                .into_values()
                .filter_map(|state| {
                    let name = state.name?;
                    let arguments = serde_json::from_str(&state.arguments)
                        .unwrap_or_else(|_| Value::String(state.arguments.clone()));
                    Some(ToolCall {
                        id: state.id,
                        name,
                        arguments,
                    })
                })
                .collect();

            return Ok(Completion {
                content: (!content.is_empty()).then_some(content),
                tool_calls: calls,
            });
        }

        let body: WireResponse = resp
            .json()
            .await
            .map_err(|err| RoundtableError::Completion(format!("response parse error: {err}")))?;

        let first = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RoundtableError::Completion("provider returned no choices".into()))?;

        let mut tool_calls = Vec::new();
        for call in first.message.tool_calls.unwrap_or_default() {
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| Value::String(call.function.arguments.clone()));
            tool_calls.push(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }

        Ok(Completion {
            content: first.message.content,
            tool_calls,
        })
    }
}

/// A deterministic client used for tests and credential-free demos. Replies
/// are consumed in order; running out of script is a completion failure.
pub struct StubClient {
    scripted: Mutex<VecDeque<Completion>>,
}

impl StubClient {
    pub fn new(scripted: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(scripted.into()),
        })
    }

    /// Convenience for text-only scripts.
    pub fn replies<S: Into<String>>(texts: Vec<S>) -> Arc<Self> {
        Self::new(texts.into_iter().map(Completion::text).collect())
    }
}

#[async_trait]
impl CompletionClient for StubClient {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolSchema],
        _stream: bool,
    ) -> Result<Completion> {
        let mut locked = self
            .scripted
            .lock()
            .map_err(|_| RoundtableError::Completion("stub client poisoned".into()))?;
        locked
            .pop_front()
            .ok_or_else(|| RoundtableError::Completion("stub client ran out of replies".into()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Default)]
struct ToolCallState {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireDeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct WireDeltaChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolResult;

    #[tokio::test]
    async fn stub_client_consumes_script_in_order() {
        let client = StubClient::replies(vec!["one", "two"]);
        let first = client.complete(&[], &[], false).await.unwrap();
        let second = client.complete(&[], &[], false).await.unwrap();

        assert_eq!(first.content.as_deref(), Some("one"));
        assert_eq!(second.content.as_deref(), Some("two"));
        assert!(client.complete(&[], &[], false).await.is_err());
    }

    #[test]
    fn wire_messages_carry_tool_results() {
        let cfg = ModelConfig {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: Some("key".into()),
            endpoint: None,
            api_version: None,
            stream: false,
        };
        let client = OpenAIClient::from_config(&cfg).unwrap();

        let message = Message {
            role: Role::Tool,
            content: "7".into(),
            source: "assistant".into(),
            tool_call: None,
            tool_result: Some(ToolResult {
                name: "calculator".into(),
                tool_call_id: Some("call_1".into()),
                content: serde_json::json!(7),
                is_error: false,
            }),
        };
        let wire = client.to_wire_messages(&[message]);

        assert_eq!(wire[0].role, "tool");
        assert_eq!(wire[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(wire[0].content.as_deref(), Some("7"));
    }

    #[test]
    fn azure_addressing_requires_endpoint() {
        let cfg = ModelConfig {
            provider: "azure".into(),
            model: "gpt-4o".into(),
            api_key: Some("key".into()),
            endpoint: None,
            api_version: None,
            stream: false,
        };
        assert!(OpenAIClient::from_config(&cfg).is_err());
    }
}
