//! Round-robin turn scheduling over a shared transcript.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::agent::ChatAgent;
use crate::error::{Result, RoundtableError};
use crate::message::Message;
use crate::termination::TerminationCondition;
use crate::transcript::Transcript;

/// Why a run stopped. `MaxTurnsExceeded` and `Cancelled` are normal
/// terminals, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    TerminatedByRule(String),
    MaxTurnsExceeded,
    Cancelled,
    Error(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminatedByRule(description) => write!(f, "terminated by rule: {description}"),
            Self::MaxTurnsExceeded => write!(f, "maximum turns exceeded"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Final outcome of a run: the full transcript and the reason it stopped.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub messages: Vec<Message>,
    pub stop_reason: StopReason,
}

/// Incremental output of [`RoundRobinTeam::run_stream`]: every appended
/// message in order, then the final result.
#[derive(Debug, Clone)]
pub enum TeamEvent {
    Message(Message),
    Finished(RunResult),
}

struct Participant {
    name: String,
    agent: Arc<Mutex<Box<dyn ChatAgent>>>,
}

/// Drives agents in fixed cyclic order against a shared transcript. One
/// agent's turn runs to completion (including its internal tool sub-loop)
/// before the next begins; there is no concurrent mutation of the
/// transcript. The transcript persists across `run` calls so a follow-up
/// task continues the conversation; `reset` starts over.
pub struct RoundRobinTeam {
    participants: Arc<Vec<Participant>>,
    transcript: Arc<RwLock<Transcript>>,
    termination: Option<Arc<dyn TerminationCondition>>,
    max_turns: Option<usize>,
}

impl Clone for RoundRobinTeam {
    fn clone(&self) -> Self {
        Self {
            participants: Arc::clone(&self.participants),
            transcript: Arc::clone(&self.transcript),
            termination: self.termination.clone(),
            max_turns: self.max_turns,
        }
    }
}

impl RoundRobinTeam {
    /// Build a team from ordered participants. Names must be unique within
    /// the run.
    pub fn new(agents: Vec<Box<dyn ChatAgent>>) -> Result<Self> {
        if agents.is_empty() {
            return Err(RoundtableError::Agent(
                "a team needs at least one agent".into(),
            ));
        }
        let mut names = HashSet::new();
        for agent in &agents {
            if !names.insert(agent.name().to_string()) {
                return Err(RoundtableError::Agent(format!(
                    "duplicate agent name `{}` in team",
                    agent.name()
                )));
            }
        }
        let participants = agents
            .into_iter()
            .map(|agent| Participant {
                name: agent.name().to_string(),
                agent: Arc::new(Mutex::new(agent)),
            })
            .collect();
        Ok(Self {
            participants: Arc::new(participants),
            transcript: Arc::new(RwLock::new(Transcript::new())),
            termination: None,
            max_turns: None,
        })
    }

    pub fn with_termination(mut self, condition: impl TerminationCondition + 'static) -> Self {
        self.termination = Some(Arc::new(condition));
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|participant| participant.name.clone())
            .collect()
    }

    /// Run to completion. Always yields a `RunResult`; agent failures are
    /// folded into the stop reason rather than raised.
    pub async fn run(&self, task: impl Into<String>) -> RunResult {
        self.drive(task.into(), &CancellationToken::new(), None)
            .await
    }

    /// Like [`run`](Self::run), but abandoned as soon as the token fires.
    /// The token is checked at every suspension point; a cancelled run
    /// reports `StopReason::Cancelled`, distinct from rule termination.
    pub async fn run_with_cancellation(
        &self,
        task: impl Into<String>,
        cancellation: &CancellationToken,
    ) -> RunResult {
        self.drive(task.into(), cancellation, None).await
    }

    /// Streaming variant: the same algorithm, yielding each appended
    /// message (task included) strictly in append order, one at a time,
    /// then `TeamEvent::Finished`. Dropping the stream cancels the
    /// producer.
    pub fn run_stream(&self, task: impl Into<String>) -> ReceiverStream<TeamEvent> {
        self.run_stream_with_cancellation(task, &CancellationToken::new())
    }

    pub fn run_stream_with_cancellation(
        &self,
        task: impl Into<String>,
        cancellation: &CancellationToken,
    ) -> ReceiverStream<TeamEvent> {
        let (tx, rx) = mpsc::channel(1);
        let team = self.clone();
        let task = task.into();
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            let result = team.drive(task, &cancellation, Some(&tx)).await;
            let _ = tx.send(TeamEvent::Finished(result)).await;
        });
        ReceiverStream::new(rx)
    }

    /// Clear the shared transcript and every agent's private context,
    /// keeping identities and tool sets for the next task.
    pub async fn reset(&self) {
        self.transcript.write().await.clear();
        for participant in self.participants.iter() {
            participant.agent.lock().await.reset();
        }
    }

    pub async fn transcript(&self) -> Transcript {
        self.transcript.read().await.clone()
    }

    async fn drive(
        &self,
        task: String,
        cancellation: &CancellationToken,
        sink: Option<&mpsc::Sender<TeamEvent>>,
    ) -> RunResult {
        tracing::debug!(agents = self.participants.len(), "team run started");

        let task_message = Message::user(task);
        self.transcript.write().await.push(task_message.clone());
        if !emit(sink, task_message).await {
            return self.finish(StopReason::Cancelled).await;
        }

        // The rule sees every append, the task seed included: a task that
        // already carries the marker stops the run before any turn.
        if let Some(reason) = self.check_termination().await {
            return self.finish(reason).await;
        }

        let mut turns = 0usize;
        loop {
            for participant in self.participants.iter() {
                if cancellation.is_cancelled() {
                    return self.finish(StopReason::Cancelled).await;
                }
                if matches!(self.max_turns, Some(max) if turns >= max) {
                    return self.finish(StopReason::MaxTurnsExceeded).await;
                }

                let snapshot = self.transcript.read().await.clone();
                let reply = participant
                    .agent
                    .lock()
                    .await
                    .respond(&snapshot, cancellation)
                    .await;

                let message = match reply {
                    Ok(message) => message,
                    Err(RoundtableError::Cancelled) => {
                        return self.finish(StopReason::Cancelled).await;
                    }
                    Err(err) => {
                        tracing::warn!(agent = %participant.name, error = %err, "turn failed");
                        return self.finish(StopReason::Error(err.to_string())).await;
                    }
                };

                self.transcript.write().await.push(message.clone());
                turns += 1;
                if !emit(sink, message).await {
                    return self.finish(StopReason::Cancelled).await;
                }

                if let Some(reason) = self.check_termination().await {
                    return self.finish(reason).await;
                }
            }
        }
    }

    async fn check_termination(&self) -> Option<StopReason> {
        let condition = self.termination.as_ref()?;
        let transcript = self.transcript.read().await;
        condition
            .is_satisfied(&transcript)
            .then(|| StopReason::TerminatedByRule(condition.description()))
    }

    async fn finish(&self, stop_reason: StopReason) -> RunResult {
        tracing::debug!(%stop_reason, "team run finished");
        RunResult {
            messages: self.transcript.read().await.messages().to_vec(),
            stop_reason,
        }
    }
}

async fn emit(sink: Option<&mpsc::Sender<TeamEvent>>, message: Message) -> bool {
    match sink {
        // A dropped consumer reads as cancellation.
        Some(tx) => tx.send(TeamEvent::Message(message)).await.is_ok(),
        None => true,
    }
}

/// Concurrent fan-out: every agent answers its own copy of the task, with
/// no shared transcript, and the replies are joined at the end in agent
/// order. The completion client is shared, so it must be safe for
/// concurrent invocation.
pub async fn fan_out(
    agents: Vec<Box<dyn ChatAgent>>,
    task: &str,
    cancellation: &CancellationToken,
) -> Vec<(String, Result<Message>)> {
    let futures = agents.into_iter().map(|mut agent| {
        let mut transcript = Transcript::new();
        transcript.push(Message::user(task));
        let cancellation = cancellation.clone();
        async move {
            let name = agent.name().to_string();
            let reply = agent.respond(&transcript, &cancellation).await;
            (name, reply)
        }
    });
    future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AssistantAgent;
    use crate::llm::StubClient;
    use crate::termination::TextMentionTermination;

    fn scripted_agent(name: &str, replies: Vec<&str>) -> Box<dyn ChatAgent> {
        Box::new(AssistantAgent::new(
            name,
            StubClient::replies(replies),
            "test agent",
        ))
    }

    #[tokio::test]
    async fn rejects_empty_teams() {
        assert!(RoundRobinTeam::new(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn rejects_duplicate_names() {
        let result = RoundRobinTeam::new(vec![
            scripted_agent("twin", vec![]),
            scripted_agent("twin", vec![]),
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stops_when_marker_appears_mid_cycle() {
        let team = RoundRobinTeam::new(vec![
            scripted_agent("chandler", vec!["joke A"]),
            scripted_agent("joey", vec!["joke B FINISH"]),
        ])
        .unwrap()
        .with_termination(TextMentionTermination::new("FINISH"));

        let result = team.run("Start the conversation").await;

        assert!(matches!(result.stop_reason, StopReason::TerminatedByRule(_)));
        // task + exactly two turns, A then B
        assert_eq!(result.messages.len(), 3);
        assert_eq!(result.messages[1].source, "chandler");
        assert_eq!(result.messages[2].source, "joey");
    }

    #[tokio::test]
    async fn max_turns_bounds_the_run() {
        let team = RoundRobinTeam::new(vec![
            scripted_agent("a", vec!["1", "4"]),
            scripted_agent("b", vec!["2", "5"]),
            scripted_agent("c", vec!["3", "6"]),
        ])
        .unwrap()
        .with_max_turns(1);

        let result = team.run("go").await;

        assert_eq!(result.stop_reason, StopReason::MaxTurnsExceeded);
        assert_eq!(result.messages.len(), 2); // task + one appended message
    }

    #[tokio::test]
    async fn max_turns_spans_multiple_cycles() {
        let team = RoundRobinTeam::new(vec![
            scripted_agent("a", vec!["1", "3", "5"]),
            scripted_agent("b", vec!["2", "4", "6"]),
        ])
        .unwrap()
        .with_max_turns(5);

        let result = team.run("go").await;

        assert_eq!(result.stop_reason, StopReason::MaxTurnsExceeded);
        assert_eq!(result.messages.len(), 6); // task + five turns
        let sources: Vec<&str> = result.messages[1..]
            .iter()
            .map(|m| m.source.as_str())
            .collect();
        assert_eq!(sources, vec!["a", "b", "a", "b", "a"]);
    }

    #[tokio::test]
    async fn marker_in_task_stops_before_any_turn() {
        let team = RoundRobinTeam::new(vec![scripted_agent("a", vec!["never"])])
            .unwrap()
            .with_termination(TextMentionTermination::new("FINISH"));

        let result = team.run("already done, FINISH").await;

        assert!(matches!(result.stop_reason, StopReason::TerminatedByRule(_)));
        assert_eq!(result.messages.len(), 1);
    }

    #[tokio::test]
    async fn completion_failure_becomes_error_stop_reason() {
        let team = RoundRobinTeam::new(vec![scripted_agent("a", vec![])])
            .unwrap()
            .with_max_turns(3);

        let result = team.run("go").await;

        assert!(matches!(result.stop_reason, StopReason::Error(_)));
        assert_eq!(result.messages.len(), 1); // only the task message
    }

    #[tokio::test]
    async fn cancelled_token_reports_cancelled() {
        let team = RoundRobinTeam::new(vec![scripted_agent("a", vec!["hi"])])
            .unwrap()
            .with_max_turns(10);

        let token = CancellationToken::new();
        token.cancel();
        let result = team.run_with_cancellation("go", &token).await;

        assert_eq!(result.stop_reason, StopReason::Cancelled);
    }

    #[tokio::test]
    async fn fan_out_joins_independent_replies() {
        let agents = vec![
            scripted_agent("alpha", vec!["a1"]),
            scripted_agent("beta", vec!["b1"]),
        ];

        let replies = fan_out(agents, "same task", &CancellationToken::new()).await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].0, "alpha");
        assert_eq!(replies[0].1.as_ref().unwrap().content, "a1");
        assert_eq!(replies[1].1.as_ref().unwrap().content, "b1");
    }
}
