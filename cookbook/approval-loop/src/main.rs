//! Human-in-the-loop: an assistant drafts, the user proxy reads your reply
//! from the console, and the run ends once you type something containing
//! APPROVE.

use std::sync::Arc;

use roundtable::{
    client_from_config, console, AppConfig, AssistantAgent, ChatAgent, CompletionClient,
    RoundRobinTeam, StubClient, TextMentionTermination, UserProxyAgent,
};

const TASK: &str = "Write a summary about the biggest news from 2025-02-03 about deepseek; \
if you can't find information just say you cannot surf the internet to find this.";

fn assistant_client(cfg: &AppConfig) -> roundtable::Result<Arc<dyn CompletionClient>> {
    if cfg.model.provider == "stub" {
        return Ok(StubClient::replies(vec![
            "I cannot surf the internet to find this, so here is a careful summary of what \
             was widely reported: deepseek drew broad attention for low-cost model training.",
            "Noted. I tightened the summary: deepseek's training-cost claims dominated the \
             news cycle that week.",
            "Thanks, finalizing the summary as written.",
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

    let assistant = AssistantAgent::new(
        "assistant",
        assistant_client(&cfg)?,
        "You are a helpful assistant. Revise your draft based on the user's feedback.",
    );
    let user_proxy = UserProxyAgent::from_stdin("user_proxy");

    let team = RoundRobinTeam::new(vec![
        Box::new(assistant) as Box<dyn ChatAgent>,
        Box::new(user_proxy),
    ])?
    .with_termination(TextMentionTermination::new("APPROVE"))
    .with_max_turns(20);

    console::render(team.run_stream(TASK)).await;

    Ok(())
}
