use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::agent::ChatAgent;
use crate::error::Result;
use crate::executor::{extract_code_blocks, CodeExecutor};
use crate::message::Message;
use crate::transcript::Transcript;

const NO_CODE_REPLY: &str =
    "No code blocks found in the last message. Provide code in a fenced ```python or ```sh block.";

/// An agent whose turn consists of executing the code blocks found in the
/// most recent message and replying with the combined output verbatim. A
/// failed or timed-out execution becomes the reply text so the conversation
/// can continue; the scheduler never sees it as an error.
pub struct CodeExecutorAgent {
    name: String,
    executor: Arc<dyn CodeExecutor>,
}

impl CodeExecutorAgent {
    pub fn new(name: impl Into<String>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }
}

#[async_trait]
impl ChatAgent for CodeExecutorAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(
        &mut self,
        transcript: &Transcript,
        cancellation: &CancellationToken,
    ) -> Result<Message> {
        let blocks = transcript
            .last()
            .map(|message| extract_code_blocks(&message.content))
            .unwrap_or_default();

        if blocks.is_empty() {
            return Ok(Message::assistant(&self.name, NO_CODE_REPLY));
        }

        tracing::debug!(agent = %self.name, blocks = blocks.len(), "executing code blocks");
        let result = self.executor.execute(&blocks, cancellation).await?;

        Ok(Message::assistant(&self.name, result.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoundtableError;
    use crate::executor::{CodeBlock, CodeResult};

    /// Scripted executor standing in for a real execution environment.
    struct FixedExecutor {
        result: CodeResult,
    }

    #[async_trait]
    impl CodeExecutor for FixedExecutor {
        async fn execute(
            &self,
            _blocks: &[CodeBlock],
            cancellation: &CancellationToken,
        ) -> Result<CodeResult> {
            if cancellation.is_cancelled() {
                return Err(RoundtableError::Cancelled);
            }
            Ok(self.result.clone())
        }
    }

    fn transcript_with(content: &str) -> Transcript {
        let mut transcript = Transcript::new();
        transcript.push(Message::assistant("writer", content));
        transcript
    }

    #[tokio::test]
    async fn replies_with_execution_output() {
        let executor = Arc::new(FixedExecutor {
            result: CodeResult {
                exit_code: 0,
                output: "377".into(),
            },
        });
        let mut agent = CodeExecutorAgent::new("code_executor", executor);

        let transcript = transcript_with("```python\nprint(fib(14))\n```");
        let reply = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.content, "377");
        assert_eq!(reply.source, "code_executor");
    }

    #[tokio::test]
    async fn failed_execution_output_is_passed_through_verbatim() {
        let executor = Arc::new(FixedExecutor {
            result: CodeResult {
                exit_code: 124,
                output: "timeout".into(),
            },
        });
        let mut agent = CodeExecutorAgent::new("code_executor", executor);

        let transcript = transcript_with("```python\nwhile True: pass\n```");
        let reply = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.content, "timeout");
    }

    #[tokio::test]
    async fn asks_for_code_when_none_present() {
        let executor = Arc::new(FixedExecutor {
            result: CodeResult {
                exit_code: 0,
                output: String::new(),
            },
        });
        let mut agent = CodeExecutorAgent::new("code_executor", executor);

        let transcript = transcript_with("here is my plan, no code yet");
        let reply = agent
            .respond(&transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert!(reply.content.contains("No code blocks"));
    }
}
