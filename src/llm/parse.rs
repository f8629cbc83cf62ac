//! Model reply parsing
//!
//! Replies are expected as `{"command": ..., "executable": ..., "explanation"?: ...}`,
//! optionally wrapped in a markdown code fence. Anything else is treated as a
//! bare command from a plain-text backend, so parsing never fails.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// The model's answer for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandProposal {
    pub command: String,
    pub executable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl CommandProposal {
    pub fn new(command: impl Into<String>, executable: bool) -> Self {
        Self {
            command: command.into(),
            executable,
            explanation: None,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Canonical JSON used as the assistant turn in the conversation
    pub fn to_transcript_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"command\":{:?},\"executable\":{}}}",
                self.command, self.executable
            )
        })
    }
}

fn open_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Any info string is dropped when it sits on its own line; a one-line
        // fence only loses a leading `json` tag.
        Regex::new(r"(?i)^```(?:[A-Za-z0-9_+.-]*[ \t]*\r?\n|json\b[ \t]*)?")
            .expect("valid open fence regex")
    })
}

fn close_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n?```$").expect("valid close fence regex"))
}

fn echo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^echo\s+(.+)$").expect("valid echo regex"))
}

/// Strip markdown code fences from a response
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = match open_fence_re().find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    let without_close = match close_fence_re().find(without_open) {
        Some(m) => &without_open[..m.start()],
        None => without_open,
    };
    without_close.trim()
}

/// Turn raw model text into a [`CommandProposal`]
pub fn parse_proposal(raw: &str, explain_mode: bool) -> CommandProposal {
    let stripped = strip_code_fences(raw);

    let proposal = match parse_structured(stripped, explain_mode) {
        Some(proposal) => proposal,
        None => {
            tracing::warn!(
                reply = crate::util::truncate_str(stripped, 200),
                "model reply was not structured JSON, treating it as a plain command"
            );
            CommandProposal::new(stripped, true)
        }
    };

    sanitize_echo(proposal)
}

fn parse_structured(text: &str, explain_mode: bool) -> Option<CommandProposal> {
    let value: Value = serde_json::from_str(text).ok()?;
    let command = value.get("command")?.as_str()?.trim().to_string();
    let executable = value.get("executable")?.as_bool()?;

    let explanation = if explain_mode {
        value
            .get("explanation")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    } else {
        None
    };

    Some(CommandProposal {
        command,
        executable,
        explanation,
    })
}

/// Replace narrating `echo` commands with their message.
///
/// An `echo` that is both executable and piped into something else is left
/// alone; every other `echo <msg>` becomes the non-executable text `<msg>`.
pub fn sanitize_echo(proposal: CommandProposal) -> CommandProposal {
    let command = proposal.command.trim();

    let rest = match echo_re().captures(command).and_then(|caps| caps.get(1)) {
        Some(rest) => rest.as_str(),
        None => return proposal,
    };

    if proposal.executable && command.contains('|') {
        return proposal;
    }

    let message = unwrap_quotes(rest).to_string();
    CommandProposal {
        command: message,
        executable: false,
        explanation: proposal.explanation,
    }
}

/// Remove one layer of matching single or double quotes
fn unwrap_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.starts_with(quote) && s.ends_with(quote) {
            return if s.len() >= 2 { &s[1..s.len() - 1] } else { "" };
        }
    }
    s
}
