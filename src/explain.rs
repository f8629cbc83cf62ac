//! `amy --explain-only`: one explain-mode round, reported without executing

use crate::environment::EnvironmentContext;
use crate::history::FailureHistory;
use crate::llm::{parse_proposal, CommandProposal, ConversationTurn, ModelClient, ModelError};
use crate::prompt::PromptBuilder;

/// Ask the model once for a command plus explanation
pub async fn explain_command(
    model: &dyn ModelClient,
    environment: &EnvironmentContext,
    history: &FailureHistory,
    user_intent: &str,
) -> Result<CommandProposal, ModelError> {
    let conversation = [
        ConversationTurn::system(PromptBuilder::build(environment, history, true)),
        ConversationTurn::user(user_intent),
    ];

    tracing::debug!(intent = user_intent, "generating command with explanation");
    let raw = model.complete(&conversation, true).await?;
    Ok(parse_proposal(&raw, true))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Human-readable report for a proposal
pub fn render_report(
    user_intent: &str,
    environment: &EnvironmentContext,
    proposal: &CommandProposal,
) -> String {
    let explanation = proposal
        .explanation
        .as_deref()
        .unwrap_or("No explanation available");

    format!(
        "
Command Explanation

Your Request:
  \"{intent}\"

Environment Context:
  OS: {platform} ({release})
  Architecture: {arch}
  Shell: {shell}
  Working Directory: {cwd}
  Running as root: {root}

Generated Command:
{command}

Executable: {executable}

Explanation:
{explanation}

To execute this command:
  amy \"{intent}\"

  Or skip confirmation:
  amy --force \"{intent}\"
",
        intent = user_intent,
        platform = environment.platform,
        release = environment.release,
        arch = environment.arch,
        shell = environment.shell,
        cwd = environment.cwd,
        root = yes_no(environment.is_root),
        command = indent(&proposal.command),
        executable = yes_no(proposal.executable),
        explanation = indent(explanation),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct OneShot {
        reply: String,
        seen: Mutex<Option<(Vec<ConversationTurn>, bool)>>,
    }

    #[async_trait]
    impl ModelClient for OneShot {
        async fn complete(
            &self,
            conversation: &[ConversationTurn],
            include_explanation: bool,
        ) -> Result<String, ModelError> {
            *self.seen.lock().unwrap() = Some((conversation.to_vec(), include_explanation));
            Ok(self.reply.clone())
        }
    }

    fn env() -> EnvironmentContext {
        EnvironmentContext {
            platform: "darwin".to_string(),
            release: "23.4.0".to_string(),
            arch: "arm64".to_string(),
            shell: "zsh".to_string(),
            cwd: "/Users/dev".to_string(),
            is_root: false,
        }
    }

    #[tokio::test]
    async fn test_explain_command_requests_explanation() {
        let model = OneShot {
            reply: r#"{"command":"df -h","executable":true,"explanation":"Shows disk usage.\nHuman-readable sizes."}"#.to_string(),
            seen: Mutex::new(None),
        };

        let proposal = explain_command(&model, &env(), &FailureHistory::default(), "disk usage")
            .await
            .unwrap();

        assert_eq!(proposal.command, "df -h");
        assert_eq!(
            proposal.explanation.as_deref(),
            Some("Shows disk usage.\nHuman-readable sizes.")
        );

        let (conversation, include_explanation) = model.seen.lock().unwrap().take().unwrap();
        assert!(include_explanation);
        assert_eq!(conversation.len(), 2);
        assert!(conversation[0].content.contains("EXPLANATION MODE"));
        assert_eq!(conversation[1].content, "disk usage");
    }

    #[test]
    fn test_report_contains_all_sections() {
        let proposal = CommandProposal::new("df -h", true)
            .with_explanation("Shows disk usage.\nHuman-readable sizes.");
        let report = render_report("disk usage", &env(), &proposal);

        assert!(report.contains("Your Request:\n  \"disk usage\""));
        assert!(report.contains("  OS: darwin (23.4.0)"));
        assert!(report.contains("  Running as root: No"));
        assert!(report.contains("Generated Command:\n  df -h"));
        assert!(report.contains("Executable: Yes"));
        assert!(report.contains("Explanation:\n  Shows disk usage.\n  Human-readable sizes."));
        assert!(report.contains("  amy --force \"disk usage\""));
    }

    #[test]
    fn test_report_without_explanation() {
        let proposal = CommandProposal::new("Hello!", false);
        let report = render_report("hi", &env(), &proposal);
        assert!(report.contains("Executable: No"));
        assert!(report.contains("Explanation:\n  No explanation available"));
    }
}
