//! A single assistant that answers math questions with the calculator tool
//! and time questions with the current_time tool. With reflection disabled
//! the raw tool result is printed back. Type `exit` to quit.

use std::sync::Arc;

use roundtable::tools::assistant_toolkit;
use roundtable::{
    client_from_config, console, AppConfig, AssistantAgent, CancellationToken, ChatAgent,
    Completion, CompletionClient, Message, StubClient, Transcript,
};
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are a helpful assistant. For math operations you always \
call your `calculator` tool, and to get the current time you call the `current_time` \
tool. You can't chat about anything else.";

fn completion_client(cfg: &AppConfig) -> roundtable::Result<Arc<dyn CompletionClient>> {
    if cfg.model.provider == "stub" {
        // Scripted demo: first question routed to the calculator, second to
        // the clock.
        return Ok(StubClient::new(vec![
            Completion::tool_call("calculator", json!({"a": 3, "b": 4, "operator": "+"})),
            Completion::tool_call("current_time", json!({})),
        ]));
    }
    client_from_config(&cfg.model)
}

#[tokio::main]
async fn main() -> roundtable::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env_or_file("roundtable.toml")?;
    let mut assistant = AssistantAgent::new("assistant", completion_client(&cfg)?, SYSTEM_PROMPT)
        .with_tools(assistant_toolkit())
        .with_reflect_on_tool_use(false);

    let mut transcript = Transcript::new();
    let cancellation = CancellationToken::new();

    while let Some(line) = console::read_user_line("User: ").await? {
        transcript.push(Message::user(line));
        match assistant.respond(&transcript, &cancellation).await {
            Ok(reply) => {
                println!("Assistant responds: {}", reply.content);
                transcript.push(reply);
            }
            Err(err) => {
                eprintln!("Assistant failed: {err}");
                break;
            }
        }
    }

    Ok(())
}
