use thiserror::Error;

pub type Result<T> = std::result::Result<T, RoundtableError>;

#[derive(Debug, Error)]
pub enum RoundtableError {
    #[error("completion request failed: {0}")]
    Completion(String),

    #[error("tool `{0}` not found")]
    UnknownTool(String),

    #[error("invalid arguments for tool `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool `{name}` invocation failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
