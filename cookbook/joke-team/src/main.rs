//! Two assistants trade jokes round-robin until one says FINISH. The first
//! round runs to completion and prints at the end; the second one streams.

use std::sync::Arc;

use roundtable::{
    client_from_config, console, AppConfig, AssistantAgent, ChatAgent, CompletionClient,
    RoundRobinTeam, StubClient, TextMentionTermination,
};

const CHANDLER_PROMPT: &str = "Your name is Chandler, and you live with Joey. You are a \
specialist in telling short story jokes about friends. After hearing two jokes from Joey \
you may finish the conversation by saying 'FINISH'.";

const JOEY_PROMPT: &str = "Your name is Joey, and you live with Chandler. You listen to \
jokes and answer with another joke. After hearing two jokes you may finish the \
conversation by saying 'FINISH'.";

fn chandler_client(cfg: &AppConfig) -> roundtable::Result<Arc<dyn CompletionClient>> {
    if cfg.model.provider == "stub" {
        return Ok(StubClient::replies(vec![
            "Why did the friend bring a ladder to brunch? The mimosas were on the house.",
            "Could that joke BE any better? Here is mine: my wallet is like an onion, opening it makes me cry.",
            "Why did the friend bring a ladder to brunch? The mimosas were on the house.",
            "Could that joke BE any better? Here is mine: my wallet is like an onion, opening it makes me cry.",
        ]));
    }
    client_from_config(&cfg.model)
}

fn joey_client(cfg: &AppConfig) -> roundtable::Result<Arc<dyn CompletionClient>> {
    if cfg.model.provider == "stub" {
        return Ok(StubClient::replies(vec![
            "How you doin'? Why don't scientists trust atoms? They make up everything.",
            "That was two good ones, I'm out. FINISH",
            "How you doin'? Why don't scientists trust atoms? They make up everything.",
            "That was two good ones, I'm out. FINISH",
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

    let chandler = AssistantAgent::new("chandler", chandler_client(&cfg)?, CHANDLER_PROMPT);
    let joey = AssistantAgent::new("joey", joey_client(&cfg)?, JOEY_PROMPT);

    let team = RoundRobinTeam::new(vec![
        Box::new(chandler) as Box<dyn ChatAgent>,
        Box::new(joey),
    ])?
    .with_termination(TextMentionTermination::new("FINISH"))
    .with_max_turns(12);

    let result = team.run("Start the conversation").await;
    console::print_result(&result);

    println!("\n##################### New round as stream #####################\n");
    team.reset().await;

    console::render(team.run_stream("Please start the round with a joke.")).await;

    Ok(())
}
