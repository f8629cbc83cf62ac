//! Subprocess execution of approved commands
//!
//! Non-zero exits are ordinary outcomes (`success: false`). Only failing to
//! start a shell at all is an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Result of one execution attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: non_empty(stdout.into()),
            stderr: non_empty(stderr.into()),
            error: None,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            stdout: non_empty(stdout.into()),
            stderr: non_empty(stderr.into()),
            error: non_empty(error.into()),
        }
    }

    /// Short cause of a failure: `error`, else `stderr`, else "Unknown error"
    pub fn failure_description(&self) -> &str {
        present(&self.error)
            .or_else(|| present(&self.stderr))
            .unwrap_or("Unknown error")
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub(crate) fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Runs a single-line shell command
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<ExecutionOutcome>;
}

/// Executes through the platform shell and echoes output to the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl ShellExecutor {
    fn shell_command(command: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }

    /// Run and capture without printing anything
    pub async fn run_captured(command: &str) -> Result<ExecutionOutcome> {
        let output = Self::shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to start shell for command: {}", command))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(ExecutionOutcome::succeeded(stdout, stderr));
        }

        let mut error = format!("Command failed with {}: {}", describe_status(output.status), command);
        let stderr_trimmed = stderr.trim();
        if !stderr_trimmed.is_empty() {
            error.push('\n');
            error.push_str(stderr_trimmed);
        }
        Ok(ExecutionOutcome::failed(error, stdout, stderr))
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionOutcome> {
        let outcome = Self::run_captured(command).await?;

        if outcome.success {
            if let Some(stderr) = present(&outcome.stderr) {
                eprintln!("stderr:\n{}", stderr);
            }
            if let Some(stdout) = present(&outcome.stdout) {
                println!("Output:\n{}", stdout);
            }
        } else {
            eprintln!("Error: {}", outcome.failure_description());
        }

        Ok(outcome)
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}
