//! Building blocks for turn-based multi-agent LLM conversations.
//!
//! The crate provides:
//! - A message/transcript model and a completion abstraction
//!   (`CompletionClient`) with OpenAI/Azure and scripted stub clients.
//! - A tool interface (`Tool`, `ToolRegistry`) with schema-validated
//!   dispatch, plus MCP-style plugin tools.
//! - Agent variants behind one `ChatAgent` contract: model-backed
//!   assistants, human-input proxies, and code executors.
//! - A round-robin team scheduler with text-mention termination, turn
//!   limits, cancellation, streaming output, and concurrent fan-out.

mod agent;
mod code_agent;
mod config;
mod error;
mod executor;
mod llm;
mod message;
mod team;
mod termination;
mod tool;
mod transcript;
mod user_proxy;

pub mod console;
pub mod mcp;
pub mod tools;

pub use agent::{AssistantAgent, ChatAgent};
pub use code_agent::CodeExecutorAgent;
pub use config::{client_from_config, AppConfig, ModelConfig};
pub use error::{Result, RoundtableError};
pub use executor::{
    extract_code_blocks, CodeBlock, CodeExecutor, CodeResult, LocalCommandExecutor,
};
pub use llm::{Completion, CompletionClient, OpenAIClient, StubClient};
pub use message::{Message, Role, ToolCall, ToolResult};
pub use team::{fan_out, RoundRobinTeam, RunResult, StopReason, TeamEvent};
pub use termination::{TerminationCondition, TextMentionTermination};
pub use tool::{validate_arguments, Tool, ToolRegistry, ToolSchema};
pub use transcript::Transcript;
pub use user_proxy::{InputFn, UserProxyAgent};

pub use tokio_util::sync::CancellationToken;
