//! A personal assistant whose tools come from an MCP plugin server. Pass
//! the server command as arguments, e.g.:
//!
//! ```sh
//! mcp-assistant npx -y @modelcontextprotocol/server-everything
//! ```
//!
//! Chat on the console; type `exit` to quit. The plugin process is stopped
//! on every exit path.

use std::env;
use std::sync::Arc;

use roundtable::mcp::{McpClient, McpToolset, StdioTransport};
use roundtable::{
    client_from_config, console, AppConfig, AssistantAgent, CancellationToken, ChatAgent,
    CompletionClient, Message, StubClient, ToolRegistry, Transcript,
};

fn completion_client(cfg: &AppConfig) -> roundtable::Result<Arc<dyn CompletionClient>> {
    if cfg.model.provider == "stub" {
        return Ok(StubClient::replies(vec![
            "With a real completion provider configured I would pick one of the plugin \
             tools to answer that.",
        ]));
    }
    client_from_config(&cfg.model)
}

#[tokio::main]
async fn main() -> roundtable::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, command_args)) = args.split_first() else {
        eprintln!("usage: mcp-assistant <server-command> [args...]");
        return Ok(());
    };
    let command_args: Vec<&str> = command_args.iter().map(String::as_str).collect();

    let cfg = AppConfig::from_env_or_file("roundtable.toml")?;
    let client = completion_client(&cfg)?;

    let transport = StdioTransport::spawn(command, &command_args)?;
    let toolset = McpToolset::new(McpClient::new(transport));

    let mut tools = ToolRegistry::new();
    let count = toolset.register_into(&mut tools).await?;
    println!("Registered {count} plugin tool(s): {:?}", tools.names());

    let mut assistant = AssistantAgent::new(
        "personal_assistant",
        client,
        "Help the user using the plugin tools available to you.",
    )
    .with_tools(tools);

    let mut transcript = Transcript::new();
    let cancellation = CancellationToken::new();

    let outcome = async {
        while let Some(line) = console::read_user_line("User: ").await? {
            transcript.push(Message::user(line));
            let reply = assistant.respond(&transcript, &cancellation).await?;
            println!("[{}]: {}", reply.source, reply.content);
            transcript.push(reply);
        }
        Ok(())
    }
    .await;

    toolset.close().await?;
    outcome
}
