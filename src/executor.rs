//! Code execution collaborator.
//!
//! The runtime's only contract with an execution environment: submit
//! labeled code blocks in order, get back an exit status and the combined
//! textual output. Timeouts and infrastructure failures come back as a
//! failed [`CodeResult`], never as an error that aborts the scheduler.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RoundtableError};

/// One fenced code block: language tag plus source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub language: String,
    pub source: String,
}

/// Combined result of executing a sequence of code blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeResult {
    pub exit_code: i32,
    pub output: String,
}

impl CodeResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execution environment boundary. Implementations may be slow or fail;
/// callers must tolerate both.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(
        &self,
        blocks: &[CodeBlock],
        cancellation: &CancellationToken,
    ) -> Result<CodeResult>;
}

/// Extract fenced code blocks from markdown text in order of appearance.
pub fn extract_code_blocks(markdown: &str) -> Vec<CodeBlock> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"```(?:[ \t]*([\w\+\-]+))?\n([\s\S]*?)```").unwrap());

    pattern
        .captures_iter(markdown)
        .map(|captures| CodeBlock {
            language: captures
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
            source: captures
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

/// Runs code blocks as local subprocesses, one file per block inside a work
/// directory. Execution stops at the first failing block. It is the
/// caller's responsibility to decide whether running model-generated code
/// on the local machine is acceptable; an isolated environment is the
/// safer default for anything untrusted.
pub struct LocalCommandExecutor {
    work_dir: PathBuf,
    timeout: Duration,
    // Keeps a generated work dir alive for the executor's lifetime.
    _temp_dir: Option<tempfile::TempDir>,
}

impl LocalCommandExecutor {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout,
            _temp_dir: None,
        }
    }

    /// Executor backed by a fresh temporary directory, removed on drop.
    pub fn with_temp_dir(timeout: Duration) -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        Ok(Self {
            work_dir: temp_dir.path().to_path_buf(),
            timeout,
            _temp_dir: Some(temp_dir),
        })
    }

    fn command_for(language: &str) -> Option<(&'static str, &'static str)> {
        match language {
            "python" | "py" | "python3" => Some(("python3", "py")),
            "sh" | "shell" | "bash" => Some(("sh", "sh")),
            _ => None,
        }
    }

    async fn run_block(&self, index: usize, block: &CodeBlock) -> Result<CodeResult> {
        let Some((program, extension)) = Self::command_for(&block.language) else {
            return Ok(CodeResult {
                exit_code: 1,
                output: format!("unsupported language `{}`", block.language),
            });
        };

        let path = self.work_dir.join(format!("block_{index}.{extension}"));
        tokio::fs::write(&path, &block.source).await?;

        let mut command = Command::new(program);
        command
            .arg(&path)
            .current_dir(&self.work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Ok(CodeResult {
                    exit_code: 124,
                    output: format!(
                        "execution timed out after {} seconds",
                        self.timeout.as_secs()
                    ),
                });
            }
            // Spawn failures (missing interpreter, permissions) are infra
            // failures, reported as a failed result rather than an error.
            Ok(Err(err)) => {
                return Ok(CodeResult {
                    exit_code: 1,
                    output: format!("failed to run `{program}`: {err}"),
                });
            }
            Ok(Ok(output)) => output,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CodeResult {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

#[async_trait]
impl CodeExecutor for LocalCommandExecutor {
    async fn execute(
        &self,
        blocks: &[CodeBlock],
        cancellation: &CancellationToken,
    ) -> Result<CodeResult> {
        let mut combined = String::new();
        let mut exit_code = 0;

        for (index, block) in blocks.iter().enumerate() {
            let result = tokio::select! {
                _ = cancellation.cancelled() => return Err(RoundtableError::Cancelled),
                result = self.run_block(index, block) => result?,
            };
            tracing::debug!(
                index,
                language = %block.language,
                exit_code = result.exit_code,
                "code block executed"
            );
            if !combined.is_empty() && !result.output.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&result.output);
            exit_code = result.exit_code;
            if !result.success() {
                break;
            }
        }

        Ok(CodeResult {
            exit_code,
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_labeled_blocks_in_order() {
        let markdown = "intro\n```python\nprint(1)\n```\ntext\n```sh\necho hi\n```\n";
        let blocks = extract_code_blocks(markdown);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].source, "print(1)\n");
        assert_eq!(blocks[1].language, "sh");
        assert_eq!(blocks[1].source, "echo hi\n");
    }

    #[test]
    fn unlabeled_block_has_empty_language() {
        let blocks = extract_code_blocks("```\nplain\n```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "");
    }

    #[test]
    fn no_blocks_in_plain_text() {
        assert!(extract_code_blocks("nothing fenced here").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_shell_block() {
        let executor = LocalCommandExecutor::with_temp_dir(Duration::from_secs(10)).unwrap();
        let blocks = vec![CodeBlock {
            language: "sh".into(),
            source: "echo hello".into(),
        }];

        let result = executor
            .execute(&blocks, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.output.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stops_at_first_failing_block() {
        let executor = LocalCommandExecutor::with_temp_dir(Duration::from_secs(10)).unwrap();
        let blocks = vec![
            CodeBlock {
                language: "sh".into(),
                source: "exit 3".into(),
            },
            CodeBlock {
                language: "sh".into(),
                source: "echo unreachable".into(),
            },
        ];

        let result = executor
            .execute(&blocks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(!result.output.contains("unreachable"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_a_failed_result_not_an_error() {
        let executor = LocalCommandExecutor::with_temp_dir(Duration::from_secs(1)).unwrap();
        let blocks = vec![CodeBlock {
            language: "sh".into(),
            source: "sleep 5".into(),
        }];

        let result = executor
            .execute(&blocks, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success());
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn unsupported_language_fails_cleanly() {
        let executor = LocalCommandExecutor::with_temp_dir(Duration::from_secs(5)).unwrap();
        let blocks = vec![CodeBlock {
            language: "cobol".into(),
            source: "DISPLAY 'HI'.".into(),
        }];

        let result = executor
            .execute(&blocks, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success());
        assert!(result.output.contains("unsupported language"));
    }
}
