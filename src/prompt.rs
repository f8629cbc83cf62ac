//! System prompt composition
//!
//! `PromptBuilder::build` is a pure function of environment, failure history
//! and mode. Identical inputs always produce byte-identical prompts.

use crate::environment::EnvironmentContext;
use crate::history::FailureHistory;
use std::fmt::Write;

const PREAMBLE: &str = "You are a shell command generator for a CLI tool called \"amy\". The user explicitly requests commands and you generate them for execution in a controlled environment with the user's full consent and supervision.";

const CONTEXT_BLOCK: &str = "CONTEXT: You are operating in a controlled environment where:
- The user has explicitly requested the command
- The user will review and confirm before execution
- The user is in full control and supervision
- This is a CLI tool designed to execute commands";

const RULES_AFTER_FORMAT: &str = "2. Generate the ACTUAL command that should be executed - NEVER generate echo commands that explain what to do
3. Use syntax appropriate for the detected shell
4. Prefer non-destructive operations unless explicitly requested
5. Include 'sudo' only when necessary and the user is not root
6. For destructive operations, ensure they match user intent exactly
7. Never output multi-line commands without proper shell syntax
8. Set executable to false ONLY for greetings, questions, or conversational responses. All actual shell commands should be executable=true
9. NEVER use echo to explain commands - generate the actual command directly
10. When user asks to \"kill\" something, generate the actual kill command - they explicitly requested it";

const RETRY_GUIDANCE: &str = "IMPORTANT: If a previous command failed, analyze the error message and generate a corrected command. Learn from the failure and try a different approach.";

const EXPLANATION_MODE: &str = r#"

EXPLANATION MODE:
When explanation is requested, provide a concise breakdown with each flag/portion on a separate line:
- Start with what the main command does
- Explain each flag or option ON ITS OWN LINE! One flag / option per line!
- End with what the command will accomplish
- Use \n to separate each line in the JSON explanation field

Examples with explanations:
Input: "list all files in the current directory"
Output: { "command": "ls -l", "executable": true, "explanation": "The 'ls' command lists directory contents.\nThe '-l' flag provides detailed information including permissions, owner, group, size, and modification date.\nThis will show all files and directories in the current working directory with full details." }

Input: "kill process on port 5000"
Output: { "command": "lsof -ti:5000 | xargs kill -9", "executable": true, "explanation": "The 'lsof' command lists open files.\nThe '-ti:5000' flag finds processes using port 5000.\nThe output is piped to 'xargs kill -9' to forcefully terminate those processes." }

Input: "hello there"
Output: { "command": "echo 'Hello! How can I assist you today?'", "executable": false, "explanation": "This input is a greeting and does not represent a valid command request." }

CRITICAL: Generate the actual command, not echo explanations. For "kill process on port 5000", output: { "command": "lsof -ti:5000 | xargs kill -9", "executable": true }

REMEMBER: If user says "kill", they want the actual kill command, not an explanation of how to kill.

FORMATTING: Each line of explanation must be separated by \n in the JSON. Example:
{ "command": "find . -name '*.txt'", "executable": true, "explanation": "The 'find' command searches for files.\nThe '.' specifies the current directory.\nThe '-name' flag matches filenames.\nThe '*.txt' pattern matches all .txt files." }"#;

const STANDARD_EXAMPLES: &str = r#"

Examples:
Input: "list all files in the current directory"
Output: { "command": "ls -l", "executable": true }

Input: "kill process on port 5000"
Output: { "command": "lsof -ti:5000 | xargs kill -9", "executable": true }

Input: "show disk usage"
Output: { "command": "df -h", "executable": true }

Input: "hello" or "how are you?"
Output: { "command": "echo 'Hello! How can I assist you today?'", "executable": false }"#;

/// Builds the system prompt that opens every conversation
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(
        environment: &EnvironmentContext,
        history: &FailureHistory,
        explain_mode: bool,
    ) -> String {
        let mut prompt = String::with_capacity(4096 + history.len() * 160);

        prompt.push_str(PREAMBLE);
        prompt.push_str("\n\n");
        prompt.push_str(&format_environment(environment));
        prompt.push_str("\n\n");
        prompt.push_str(CONTEXT_BLOCK);
        prompt.push_str("\n\nCRITICAL RULES:\n");
        prompt.push_str(&format_rule(explain_mode));
        prompt.push('\n');
        prompt.push_str(RULES_AFTER_FORMAT);
        prompt.push_str("\n\n");
        prompt.push_str(RETRY_GUIDANCE);
        prompt.push_str(&format_failures(history));

        if explain_mode {
            prompt.push_str(EXPLANATION_MODE);
        } else {
            prompt.push_str(STANDARD_EXAMPLES);
        }

        prompt
    }
}

fn format_rule(explain_mode: bool) -> String {
    let explanation = if explain_mode {
        r#", "explanation": "detailed_explanation""#
    } else {
        ""
    };
    format!(
        r#"1. ALWAYS output your response as valid JSON: {{ "command": "actual_command", "executable": true/false{} }}"#,
        explanation
    )
}

fn format_environment(env: &EnvironmentContext) -> String {
    format!(
        "ENVIRONMENT:
- Operating System: {} ({})
- Architecture: {}
- Shell: {}
- Working Directory: {}
- Running as root: {}",
        env.platform, env.release, env.arch, env.shell, env.cwd, env.is_root
    )
}

/// Numbered past-failures block, empty when there is no history
fn format_failures(history: &FailureHistory) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut block = String::from("\n\nLEARNING FROM PAST FAILURES:\n");
    block.push_str(
        "The following commands have failed in the past on this system. Avoid repeating these mistakes:\n\n",
    );

    for (index, failure) in history.failures.iter().enumerate() {
        // Writing to a String cannot fail
        let _ = write!(
            block,
            "{}. Intent: \"{}\"\n   Failed Command: {}\n   Error: {}\n\n",
            index + 1,
            failure.user_intent,
            failure.failed_command,
            failure.error
        );
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::FailureRecord;

    fn env() -> EnvironmentContext {
        EnvironmentContext {
            platform: "linux".to_string(),
            release: "6.1.0".to_string(),
            arch: "x64".to_string(),
            shell: "bash".to_string(),
            cwd: "/home/dev/project".to_string(),
            is_root: false,
        }
    }

    fn history_with(records: &[(&str, &str, &str)]) -> FailureHistory {
        let mut history = FailureHistory::default();
        for (intent, cmd, err) in records {
            history.push(FailureRecord::new(*intent, *cmd, *err));
        }
        history
    }

    #[test]
    fn test_build_is_deterministic() {
        let history = history_with(&[("show tree", "tree", "command not found: tree")]);
        for explain in [false, true] {
            assert_eq!(
                PromptBuilder::build(&env(), &history, explain),
                PromptBuilder::build(&env(), &history, explain)
            );
        }
    }

    #[test]
    fn test_environment_block_in_fixed_order() {
        let prompt = PromptBuilder::build(&env(), &FailureHistory::default(), false);
        assert!(prompt.starts_with(PREAMBLE));
        assert!(prompt.contains(
            "ENVIRONMENT:\n- Operating System: linux (6.1.0)\n- Architecture: x64\n- Shell: bash\n- Working Directory: /home/dev/project\n- Running as root: false"
        ));
    }

    #[test]
    fn test_root_flag_is_rendered() {
        let mut root_env = env();
        root_env.is_root = true;
        let prompt = PromptBuilder::build(&root_env, &FailureHistory::default(), false);
        assert!(prompt.contains("- Running as root: true"));
    }

    #[test]
    fn test_failures_block_absent_when_history_empty() {
        let prompt = PromptBuilder::build(&env(), &FailureHistory::default(), false);
        assert!(!prompt.contains("LEARNING FROM PAST FAILURES"));
    }

    #[test]
    fn test_failures_block_is_numbered_from_one() {
        let history = history_with(&[
            ("show directory tree", "tree", "command not found: tree"),
            ("list files", "lss", "lss: not found"),
        ]);
        let prompt = PromptBuilder::build(&env(), &history, false);

        assert!(prompt.contains("LEARNING FROM PAST FAILURES:\nThe following commands have failed in the past on this system. Avoid repeating these mistakes:\n\n"));
        assert!(prompt.contains(
            "1. Intent: \"show directory tree\"\n   Failed Command: tree\n   Error: command not found: tree\n\n"
        ));
        assert!(prompt.contains("2. Intent: \"list files\"\n   Failed Command: lss\n   Error: lss: not found\n\n"));

        let retry_at = prompt.find(RETRY_GUIDANCE).unwrap();
        let failures_at = prompt.find("LEARNING FROM PAST FAILURES").unwrap();
        let examples_at = prompt.find("\n\nExamples:\n").unwrap();
        assert!(retry_at < failures_at && failures_at < examples_at);
    }

    #[test]
    fn test_plain_mode_has_examples_only() {
        let prompt = PromptBuilder::build(&env(), &FailureHistory::default(), false);
        assert!(prompt.ends_with(STANDARD_EXAMPLES));
        assert!(!prompt.contains("EXPLANATION MODE"));
        assert!(prompt.contains(
            r#"1. ALWAYS output your response as valid JSON: { "command": "actual_command", "executable": true/false }"#
        ));
    }

    #[test]
    fn test_explain_mode_has_formatting_rules_only() {
        let prompt = PromptBuilder::build(&env(), &FailureHistory::default(), true);
        assert!(prompt.ends_with(EXPLANATION_MODE));
        assert!(!prompt.contains("\n\nExamples:\n"));
        assert!(prompt.contains(
            r#"1. ALWAYS output your response as valid JSON: { "command": "actual_command", "executable": true/false, "explanation": "detailed_explanation" }"#
        ));
    }

    #[test]
    fn test_rules_are_numbered_one_to_ten() {
        let prompt = PromptBuilder::build(&env(), &FailureHistory::default(), false);
        let rules_at = prompt.find("CRITICAL RULES:\n").unwrap();
        let mut last = rules_at;
        for n in 1..=10 {
            let at = prompt[last..].find(&format!("\n{}. ", n)).map(|i| i + last).unwrap();
            assert!(at >= last);
            last = at;
        }
    }
}
