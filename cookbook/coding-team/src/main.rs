//! A code writer and a local code executor solve a task round-robin: the
//! writer suggests fenced code blocks, the executor runs them and feeds the
//! output back, and the writer says FINISH once the answer is verified.

use std::sync::Arc;
use std::time::Duration;

use roundtable::{
    client_from_config, console, AppConfig, AssistantAgent, ChatAgent, CodeExecutorAgent,
    CompletionClient, LocalCommandExecutor, RoundRobinTeam, StubClient, TextMentionTermination,
};

const WRITER_PROMPT: &str = "You are a helpful AI assistant. Solve tasks using your coding \
skills. Suggest python code in a ```python block or shell script in a ```sh block for the \
user to execute; always write complete code, never partial snippets, and use print for \
any output you need to see. Check the execution result the user reports. If it shows an \
error, fix the error and output the full corrected code. When the task is done and the \
output is verified, reply 'FINISH'.";

const STUB_PROGRAM: &str = "```python
a, b = 0, 1
for _ in range(14):
    a, b = b, a + b
print(a)
```";

fn writer_client(cfg: &AppConfig) -> roundtable::Result<Arc<dyn CompletionClient>> {
    if cfg.model.provider == "stub" {
        return Ok(StubClient::replies(vec![
            format!("Here is a program that computes it:\n{STUB_PROGRAM}"),
            "The 14th Fibonacci number is 377. FINISH".to_string(),
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

    let writer = AssistantAgent::new("code_writer", writer_client(&cfg)?, WRITER_PROMPT);
    let executor = LocalCommandExecutor::with_temp_dir(Duration::from_secs(10))?;
    let runner = CodeExecutorAgent::new("code_executor", Arc::new(executor));

    let team = RoundRobinTeam::new(vec![
        Box::new(writer) as Box<dyn ChatAgent>,
        Box::new(runner),
    ])?
    .with_termination(TextMentionTermination::new("FINISH"))
    .with_max_turns(10);

    console::render(team.run_stream("Write Python code to calculate the 14th Fibonacci number."))
        .await;

    Ok(())
}
