//! Line-oriented console boundary for the cookbook demos.

use std::io::{self, Write};

use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Result, RoundtableError};
use crate::team::{RunResult, TeamEvent};

/// Sentinel that ends an interactive loop.
pub const EXIT_SENTINEL: &str = "exit";

/// Consume a [`run_stream`](crate::team::RoundRobinTeam::run_stream) event
/// stream, printing each message with its speaker label as it arrives, and
/// return the final result.
pub async fn render(mut stream: ReceiverStream<TeamEvent>) -> Option<RunResult> {
    while let Some(event) = stream.next().await {
        match event {
            TeamEvent::Message(message) => {
                println!("[{}]: {}", message.source, message.content);
            }
            TeamEvent::Finished(result) => {
                println!("Stop reason: {}", result.stop_reason);
                return Some(result);
            }
        }
    }
    None
}

/// Print a completed run the same way `render` would have.
pub fn print_result(result: &RunResult) {
    for message in &result.messages {
        println!("[{}]: {}", message.source, message.content);
    }
    println!("Stop reason: {}", result.stop_reason);
}

/// Prompt and read one line from standard input, without blocking the
/// runtime. Returns `None` once the user types the exit sentinel.
pub async fn read_user_line(prompt: &str) -> Result<Option<String>> {
    let prompt = prompt.to_string();
    let line = tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    })
    .await
    .map_err(|err| RoundtableError::Agent(format!("input task failed: {err}")))??;

    if line == EXIT_SENTINEL {
        return Ok(None);
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::team::StopReason;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn render_returns_the_final_result() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(TeamEvent::Message(Message::user("task"))).await.unwrap();
        tx.send(TeamEvent::Finished(RunResult {
            messages: vec![Message::user("task")],
            stop_reason: StopReason::MaxTurnsExceeded,
        }))
        .await
        .unwrap();
        drop(tx);

        let result = render(ReceiverStream::new(rx)).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::MaxTurnsExceeded);
    }
}
