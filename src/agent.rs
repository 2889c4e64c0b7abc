use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, RoundtableError};
use crate::llm::CompletionClient;
use crate::message::{render_value, Message, Role, ToolCall, ToolResult};
use crate::tool::ToolRegistry;
use crate::transcript::Transcript;

/// A participant in a team conversation. The scheduler owns the shared
/// transcript: `respond` reads it and returns one message, which the caller
/// appends. Variants (assistant, human proxy, code executor) are selected at
/// construction and share this contract.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Identifier, unique within a run.
    fn name(&self) -> &str;

    async fn respond(
        &mut self,
        transcript: &Transcript,
        cancellation: &CancellationToken,
    ) -> Result<Message>;

    /// Drop any privately retained context, keeping identity and tool set.
    fn reset(&mut self) {}
}

/// A model-backed agent with an optional tool set.
///
/// The agent keeps a private view of the conversation: its system message,
/// the shared transcript messages it has seen so far, and the tool-call
/// exchanges from its own turns (which never enter the shared transcript).
/// A cursor tracks how much of the shared transcript has already been
/// folded in; the agent's own appended replies are skipped during the sync
/// since they are already present.
pub struct AssistantAgent {
    name: String,
    client: Arc<dyn CompletionClient>,
    tools: ToolRegistry,
    reflect_on_tool_use: bool,
    stream: bool,
    max_tool_rounds: usize,
    context: Vec<Message>,
    seen: usize,
}

impl AssistantAgent {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn CompletionClient>,
        system_message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            tools: ToolRegistry::new(),
            reflect_on_tool_use: true,
            stream: false,
            max_tool_rounds: 8,
            context: vec![Message::system(system_message)],
            seen: 0,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// When disabled, the raw tool result is returned directly as the
    /// agent's reply instead of being phrased by one more completion call.
    pub fn with_reflect_on_tool_use(mut self, reflect: bool) -> Self {
        self.reflect_on_tool_use = reflect;
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    /// The system message this agent was constructed with.
    pub fn system_message(&self) -> &str {
        self.context
            .first()
            .filter(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }

    fn sync_from(&mut self, transcript: &Transcript) {
        for message in transcript.messages().iter().skip(self.seen) {
            if message.source != self.name {
                self.context.push(message.clone());
            }
        }
        self.seen = transcript.len();
    }

    async fn run_tool_call(&self, call: &ToolCall) -> ToolResult {
        let id = call
            .id
            .clone()
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
        match self.tools.dispatch(&call.name, call.arguments.clone()).await {
            Ok(value) => ToolResult {
                name: call.name.clone(),
                tool_call_id: Some(id),
                content: value,
                is_error: false,
            },
            // Dispatch failures ride the same path as successes so the next
            // completion can self-correct.
            Err(err) => ToolResult {
                name: call.name.clone(),
                tool_call_id: Some(id),
                content: serde_json::json!({ "error": err.to_string() }),
                is_error: true,
            },
        }
    }
}

#[async_trait]
impl ChatAgent for AssistantAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(
        &mut self,
        transcript: &Transcript,
        cancellation: &CancellationToken,
    ) -> Result<Message> {
        self.sync_from(transcript);
        let schemas = self.tools.schemas();

        for _ in 0..self.max_tool_rounds {
            let completion = tokio::select! {
                _ = cancellation.cancelled() => return Err(RoundtableError::Cancelled),
                result = self.client.complete(&self.context, &schemas, self.stream) => result?,
            };

            if completion.tool_calls.is_empty() {
                let content = completion.content.unwrap_or_default();
                let reply = Message::assistant(&self.name, content);
                self.context.push(reply.clone());
                return Ok(reply);
            }

            let mut results = Vec::new();
            for call in &completion.tool_calls {
                if cancellation.is_cancelled() {
                    return Err(RoundtableError::Cancelled);
                }
                tracing::debug!(agent = %self.name, tool = %call.name, "dispatching tool call");
                let result = self.run_tool_call(call).await;
                self.context.push(Message::tool_call(
                    &self.name,
                    ToolCall {
                        id: result.tool_call_id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                ));
                self.context.push(Message::tool_result(&self.name, result.clone()));
                results.push(result);
            }

            if !self.reflect_on_tool_use {
                let content = results
                    .iter()
                    .map(|result| render_value(&result.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                let reply = Message::assistant(&self.name, content);
                self.context.push(reply.clone());
                return Ok(reply);
            }
        }

        Err(RoundtableError::Agent(format!(
            "agent `{}` exceeded {} tool rounds without a final reply",
            self.name, self.max_tool_rounds
        )))
    }

    fn reset(&mut self) {
        self.context.truncate(1);
        self.seen = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, StubClient};
    use crate::tools::CalculatorTool;
    use serde_json::json;

    fn transcript_with_task(task: &str) -> Transcript {
        let mut transcript = Transcript::new();
        transcript.push(Message::user(task));
        transcript
    }

    #[tokio::test]
    async fn replies_with_completion_text() {
        let client = StubClient::replies(vec!["hello there"]);
        let mut agent = AssistantAgent::new("comic", client, "You tell jokes.");

        let transcript = transcript_with_task("tell me a joke");
        let reply = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.content, "hello there");
        assert_eq!(reply.source, "comic");
        assert_eq!(reply.role, Role::Assistant);
    }

    #[tokio::test]
    async fn raw_tool_result_when_reflection_disabled() {
        let client = StubClient::new(vec![Completion::tool_call(
            "calculator",
            json!({"a": 3, "b": 4, "operator": "+"}),
        )]);
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        let mut agent = AssistantAgent::new("assistant", client, "You do math with tools.")
            .with_tools(tools)
            .with_reflect_on_tool_use(false);

        let transcript = transcript_with_task("what is 3 + 4");
        let reply = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.content, "7");
    }

    #[tokio::test]
    async fn reflects_on_tool_result_when_enabled() {
        let client = StubClient::new(vec![
            Completion::tool_call("calculator", json!({"a": 3, "b": 4, "operator": "+"})),
            Completion::text("The answer is 7."),
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        let mut agent =
            AssistantAgent::new("assistant", client, "You do math with tools.").with_tools(tools);

        let transcript = transcript_with_task("what is 3 + 4");
        let reply = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.content, "The answer is 7.");
    }

    #[tokio::test]
    async fn unknown_tool_feeds_error_back_to_the_model() {
        let client = StubClient::new(vec![
            Completion::tool_call("no_such_tool", json!({})),
            Completion::text("I could not use that tool."),
        ]);
        let mut agent = AssistantAgent::new("assistant", client, "instructions");

        let transcript = transcript_with_task("go");
        let reply = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.content, "I could not use that tool.");
        let error_result = agent
            .context
            .iter()
            .find_map(|message| message.tool_result.as_ref())
            .unwrap();
        assert!(error_result.is_error);
        assert!(error_result.content["error"]
            .as_str()
            .unwrap()
            .contains("not found"));
    }

    #[tokio::test]
    async fn completion_failure_propagates() {
        let client = StubClient::new(Vec::new());
        let mut agent = AssistantAgent::new("assistant", client, "instructions");

        let transcript = transcript_with_task("go");
        let err = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RoundtableError::Completion(_)));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_respond() {
        let client = StubClient::replies(vec!["never delivered"]);
        let mut agent = AssistantAgent::new("assistant", client, "instructions");

        let token = CancellationToken::new();
        token.cancel();
        let transcript = transcript_with_task("go");
        let err = agent.respond(&transcript, &token).await.unwrap_err();
        assert!(matches!(err, RoundtableError::Cancelled));
    }

    #[tokio::test]
    async fn reset_clears_retained_context() {
        let client = StubClient::replies(vec!["first"]);
        let mut agent = AssistantAgent::new("assistant", client, "instructions");

        let transcript = transcript_with_task("go");
        agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();
        assert!(agent.context.len() > 1);

        agent.reset();
        assert_eq!(agent.context.len(), 1);
        assert_eq!(agent.system_message(), "instructions");
    }
}
