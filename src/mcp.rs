//! Client for MCP-style tool-server plugins.
//!
//! A plugin is a long-lived subprocess or HTTP service exposing named tools
//! over JSON-RPC. The runtime only relies on the abstract contract:
//! discover tools with schemas, invoke by name with arguments, receive a
//! structured result. Discovered tools are wrapped as ordinary [`Tool`]s so
//! agents reach them through the usual dispatch path. Transports are
//! acquired on start and must be released with [`McpClient::close`] on all
//! exit paths; closing a stdio transport kills the server process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::{Result, RoundtableError};
use crate::tool::{Tool, ToolRegistry};

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: 0,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// A tool advertised by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ListToolsResult {
    tools: Vec<PluginToolDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenated text content; non-text items are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.as_str()),
                ContentItem::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct InitializeResult {
    #[serde(rename = "serverInfo")]
    server_info: ServerInfo,
}

/// Request/response transport to a plugin server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    async fn close(&self) -> Result<()>;
}

/// Talks to a plugin server spawned as a subprocess, one JSON-RPC message
/// per line over stdin/stdout.
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<BufReader<ChildStdout>>>,
    request_id: AtomicU64,
}

impl StdioTransport {
    pub fn spawn(command: &str, args: &[&str]) -> Result<Self> {
        Self::spawn_with_env(command, args, HashMap::new())
    }

    pub fn spawn_with_env(
        command: &str,
        args: &[&str],
        env: HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|err| RoundtableError::Mcp(format!("failed to spawn plugin server: {err}")))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(BufReader::new);

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            request_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        request.id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let raw = serde_json::to_string(&request)?;

        {
            let mut stdin = self.stdin.lock().await;
            let stdin = stdin
                .as_mut()
                .ok_or_else(|| RoundtableError::Mcp("plugin server stdin closed".into()))?;
            stdin
                .write_all(raw.as_bytes())
                .await
                .map_err(|err| RoundtableError::Mcp(format!("write to plugin failed: {err}")))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|err| RoundtableError::Mcp(format!("write to plugin failed: {err}")))?;
            stdin
                .flush()
                .await
                .map_err(|err| RoundtableError::Mcp(format!("flush to plugin failed: {err}")))?;
        }

        let mut stdout = self.stdout.lock().await;
        let stdout = stdout
            .as_mut()
            .ok_or_else(|| RoundtableError::Mcp("plugin server stdout closed".into()))?;
        let mut line = String::new();
        stdout
            .read_line(&mut line)
            .await
            .map_err(|err| RoundtableError::Mcp(format!("read from plugin failed: {err}")))?;

        serde_json::from_str(&line)
            .map_err(|err| RoundtableError::Mcp(format!("malformed plugin response: {err}")))
    }

    async fn close(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if let Some(child) = child.as_mut() {
            child
                .kill()
                .await
                .map_err(|err| RoundtableError::Mcp(format!("failed to stop plugin: {err}")))?;
        }
        Ok(())
    }
}

/// Talks to a plugin server over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            request_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        request.id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| RoundtableError::Mcp(format!("plugin request failed: {err}")))?;
        response
            .json()
            .await
            .map_err(|err| RoundtableError::Mcp(format!("malformed plugin response: {err}")))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Client for one plugin server: initialize once, then list and call tools.
pub struct McpClient<T: McpTransport> {
    transport: T,
    initialized: bool,
    server_info: Option<ServerInfo>,
}

impl<T: McpTransport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            initialized: false,
            server_info: None,
        }
    }

    pub async fn initialize(&mut self) -> Result<&ServerInfo> {
        if !self.initialized {
            let request = JsonRpcRequest::new(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "roundtable",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            );
            let response = self.transport.send(request).await?;
            let result: InitializeResult =
                serde_json::from_value(expect_result(response, "initialize")?)?;
            self.server_info = Some(result.server_info);
            self.initialized = true;

            let notification = JsonRpcRequest::new("notifications/initialized", None);
            let _ = self.transport.send(notification).await;
        }

        self.server_info
            .as_ref()
            .ok_or_else(|| RoundtableError::Mcp("server info not available".into()))
    }

    pub async fn list_tools(&mut self) -> Result<Vec<PluginToolDefinition>> {
        self.initialize().await?;
        let response = self
            .transport
            .send(JsonRpcRequest::new("tools/list", None))
            .await?;
        let result: ListToolsResult =
            serde_json::from_value(expect_result(response, "tools/list")?)?;
        Ok(result.tools)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.initialize().await?;
        let response = self
            .transport
            .send(JsonRpcRequest::new(
                "tools/call",
                Some(serde_json::json!({ "name": name, "arguments": arguments })),
            ))
            .await?;
        Ok(serde_json::from_value(expect_result(
            response,
            "tools/call",
        )?)?)
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }
}

fn expect_result(response: JsonRpcResponse, method: &str) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(RoundtableError::Mcp(format!(
            "{method} failed: {} (code {})",
            error.message, error.code
        )));
    }
    Ok(response.result.unwrap_or_default())
}

/// Registers every tool a plugin server advertises into a [`ToolRegistry`],
/// optionally under a name prefix to keep multiple plugins apart.
pub struct McpToolset<T: McpTransport + 'static> {
    client: Arc<Mutex<McpClient<T>>>,
    prefix: Option<String>,
}

impl<T: McpTransport + 'static> McpToolset<T> {
    pub fn new(client: McpClient<T>) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Discover the server's tools and register each one. Returns how many
    /// were added.
    pub async fn register_into(&self, registry: &mut ToolRegistry) -> Result<usize> {
        let definitions = self.client.lock().await.list_tools().await?;
        let count = definitions.len();

        for definition in definitions {
            let registered_name = match &self.prefix {
                Some(prefix) => format!("{prefix}_{}", definition.name),
                None => definition.name.clone(),
            };
            registry.register(PluginTool {
                name: registered_name,
                description: definition
                    .description
                    .unwrap_or_else(|| format!("Plugin tool `{}`", definition.name)),
                parameters: definition.input_schema,
                remote_name: definition.name,
                client: Arc::clone(&self.client),
            });
        }

        Ok(count)
    }

    pub async fn close(&self) -> Result<()> {
        self.client.lock().await.close().await
    }
}

struct PluginTool<T: McpTransport + 'static> {
    name: String,
    description: String,
    parameters: Value,
    remote_name: String,
    client: Arc<Mutex<McpClient<T>>>,
}

#[async_trait]
impl<T: McpTransport + 'static> Tool for PluginTool<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Option<Value> {
        Some(self.parameters.clone())
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let result = self
            .client
            .lock()
            .await
            .call_tool(&self.remote_name, input)
            .await?;
        if result.is_error {
            return Err(RoundtableError::Mcp(result.text()));
        }
        Ok(Value::String(result.text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_params() {
        let request = JsonRpcRequest::new("tools/list", None);
        let raw = serde_json::to_string(&request).unwrap();
        assert!(raw.contains("\"jsonrpc\":\"2.0\""));
        assert!(raw.contains("\"method\":\"tools/list\""));
        assert!(!raw.contains("params"));
    }

    #[test]
    fn response_with_error_is_rejected() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        let err = expect_result(response, "tools/list").unwrap_err();
        assert!(err.to_string().contains("no such method"));
    }

    #[test]
    fn tool_definition_deserializes() {
        let raw = r#"{
            "name": "get_specials",
            "description": "List menu specials",
            "inputSchema": { "type": "object", "properties": {} }
        }"#;
        let definition: PluginToolDefinition = serde_json::from_str(raw).unwrap();
        assert_eq!(definition.name, "get_specials");
    }

    #[test]
    fn call_result_concatenates_text_content() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "one"},
                {"type": "image", "data": "...", "mimeType": "image/png"},
                {"type": "text", "text": "two"}
            ],
            "isError": false
        }"#;
        let result: CallToolResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.text(), "one\ntwo");
    }
}
