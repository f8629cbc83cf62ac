//! Interactive approval before a proposed command runs

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{self, BufRead, Write};

/// Yields an explicit approve/decline for a displayed command
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, command: &str) -> Result<bool>;
}

/// Asks on the terminal with `Run this? [y/N]`
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmation;

#[async_trait]
impl ConfirmationGate for TerminalConfirmation {
    async fn confirm(&self, _command: &str) -> Result<bool> {
        let answer = tokio::task::spawn_blocking(read_answer)
            .await
            .context("Confirmation prompt task failed")??;

        let approved = is_approval(&answer);
        if !approved {
            println!("Aborted.");
        }
        Ok(approved)
    }
}

fn read_answer() -> Result<String> {
    print!("Run this? [y/N] ");
    io::stdout().flush().context("Failed to write confirmation prompt")?;

    let mut line = String::new();
    // EOF leaves the line empty, which reads as a decline
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read confirmation answer")?;
    Ok(line)
}

/// Only a lone `y` (either case) approves
pub fn is_approval(answer: &str) -> bool {
    answer.trim_end_matches(['\r', '\n']).eq_ignore_ascii_case("y")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_y_approves() {
        assert!(is_approval("y\n"));
        assert!(is_approval("Y\r\n"));
        assert!(is_approval("y"));

        assert!(!is_approval(""));
        assert!(!is_approval("\n"));
        assert!(!is_approval("n\n"));
        assert!(!is_approval("yes\n"));
        assert!(!is_approval(" y\n"));
    }
}
