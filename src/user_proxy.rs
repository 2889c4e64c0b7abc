use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::agent::ChatAgent;
use crate::error::{Result, RoundtableError};
use crate::message::{Message, Role};
use crate::transcript::Transcript;

/// Produces one line of human input per turn.
pub type InputFn = Arc<dyn Fn() -> io::Result<String> + Send + Sync>;

/// An agent that proxies a human into the conversation. The injected input
/// function runs on a blocking thread so a console read does not stall the
/// scheduler's runtime.
pub struct UserProxyAgent {
    name: String,
    input: InputFn,
}

impl UserProxyAgent {
    pub fn new(name: impl Into<String>, input: InputFn) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }

    /// Proxy reading lines from standard input.
    pub fn from_stdin(name: impl Into<String>) -> Self {
        Self::new(
            name,
            Arc::new(|| {
                let mut line = String::new();
                io::stdin().read_line(&mut line)?;
                Ok(line.trim_end_matches(['\r', '\n']).to_string())
            }),
        )
    }
}

#[async_trait]
impl ChatAgent for UserProxyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(
        &mut self,
        _transcript: &Transcript,
        cancellation: &CancellationToken,
    ) -> Result<Message> {
        let input = Arc::clone(&self.input);
        let line = tokio::select! {
            _ = cancellation.cancelled() => return Err(RoundtableError::Cancelled),
            joined = tokio::task::spawn_blocking(move || input()) => joined
                .map_err(|err| RoundtableError::Agent(format!("input task failed: {err}")))??,
        };

        Ok(Message {
            role: Role::User,
            content: line,
            source: self.name.clone(),
            tool_call: None,
            tool_result: None,
        })
    }
}
