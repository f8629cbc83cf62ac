//! Command generation session
//!
//! Drives one user request to a terminal state:
//!
//! ```text
//! INIT -> AWAIT_MODEL -> PARSE -> NONEXECUTABLE_DONE
//!                             \-> AWAIT_CONFIRM -> CANCELLED_DONE
//!                                               \-> EXECUTE -> SUCCESS_DONE
//!                                                           \-> FAILURE_RETRY -> AWAIT_MODEL
//! any state -> ERROR_DONE
//! ```
//!
//! Failed executions are persisted to the failure history and reported back to
//! the model as a new user turn. There is no retry cap; the loop ends only on
//! success, cancellation, a non-executable answer, or a session error.

use crate::confirm::ConfirmationGate;
use crate::environment::EnvironmentContext;
use crate::executor::{present, CommandExecutor, ExecutionOutcome};
use crate::history::FailureHistoryStore;
use crate::llm::{parse_proposal, CommandProposal, ConversationTurn, ModelClient, ModelError};
use crate::prompt::PromptBuilder;
use std::sync::Arc;
use thiserror::Error;

const SEPARATOR: &str = "====================================================";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Skip the confirmation prompt
    pub force: bool,
    /// Request and display an explanation alongside the command
    pub explain: bool,
}

/// Unrecoverable failure of a whole session. Command failures are not errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session error: {0}")]
    Model(#[from] ModelError),
    #[error("Session error: {0:#}")]
    Environment(anyhow::Error),
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The model answered conversationally; nothing was run
    NonExecutable(CommandProposal),
    /// The user declined the proposed command
    Cancelled(CommandProposal),
    /// The command ran successfully after `attempts` executions
    Succeeded {
        proposal: CommandProposal,
        attempts: usize,
    },
}

/// Collaborators a session needs, constructed by the caller
#[derive(Clone)]
pub struct SessionContext {
    pub environment: EnvironmentContext,
    pub model: Arc<dyn ModelClient>,
    pub confirmation: Arc<dyn ConfirmationGate>,
    pub executor: Arc<dyn CommandExecutor>,
    pub history: FailureHistoryStore,
}

pub struct SessionController {
    context: SessionContext,
    options: SessionOptions,
    conversation: Vec<ConversationTurn>,
}

impl SessionController {
    pub fn new(context: SessionContext, options: SessionOptions) -> Self {
        Self {
            context,
            options,
            conversation: Vec::new(),
        }
    }

    /// Turns exchanged so far in the current (or last) run
    pub fn conversation(&self) -> &[ConversationTurn] {
        &self.conversation
    }

    /// Run one request to a terminal state
    pub async fn run(&mut self, user_intent: &str) -> Result<SessionOutcome, SessionError> {
        tracing::debug!(intent = user_intent, "starting command session");

        match self.run_loop(user_intent).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::debug!(error = %err, "command session ended with an error");
                Err(err)
            }
        }
    }

    async fn run_loop(&mut self, user_intent: &str) -> Result<SessionOutcome, SessionError> {
        let history = self.context.history.load();
        let system_prompt =
            PromptBuilder::build(&self.context.environment, &history, self.options.explain);
        self.conversation = vec![
            ConversationTurn::system(system_prompt),
            ConversationTurn::user(user_intent),
        ];

        let mut attempts = 0;
        loop {
            tracing::debug!(
                history_len = self.conversation.len(),
                "generating command with history"
            );
            let raw = self
                .context
                .model
                .complete(&self.conversation, self.options.explain)
                .await?;

            let proposal = parse_proposal(&raw, self.options.explain);
            tracing::debug!(
                command = %proposal.command,
                executable = proposal.executable,
                "command generated"
            );
            self.conversation
                .push(ConversationTurn::assistant(proposal.to_transcript_json()));

            if !proposal.executable {
                self.display_answer(&proposal);
                return Ok(SessionOutcome::NonExecutable(proposal));
            }

            self.display_proposal(&proposal);

            if !self.options.force {
                let approved = self
                    .context
                    .confirmation
                    .confirm(&proposal.command)
                    .await
                    .map_err(SessionError::Environment)?;
                if !approved {
                    tracing::debug!("execution cancelled by user");
                    return Ok(SessionOutcome::Cancelled(proposal));
                }
            }

            attempts += 1;
            let outcome = self
                .context
                .executor
                .execute(&proposal.command)
                .await
                .map_err(SessionError::Environment)?;

            if outcome.success {
                tracing::debug!(attempts, "command executed successfully");
                return Ok(SessionOutcome::Succeeded { proposal, attempts });
            }

            let error = outcome.failure_description();
            tracing::debug!(
                command = %proposal.command,
                error,
                "command failed, recording and retrying"
            );
            self.context
                .history
                .record(user_intent, &proposal.command, error)
                .map_err(SessionError::Environment)?;

            self.conversation
                .push(ConversationTurn::user(failure_message(&outcome)));
        }
    }

    fn display_answer(&self, proposal: &CommandProposal) {
        println!("{}", proposal.command);
        if let Some(explanation) = self.explanation_to_show(proposal) {
            println!("{}", explanation);
        }
    }

    fn display_proposal(&self, proposal: &CommandProposal) {
        println!("{}", SEPARATOR);
        println!("Command:   {}", proposal.command);
        println!("{}", SEPARATOR);
        if let Some(explanation) = self.explanation_to_show(proposal) {
            println!("Explanation:\n{}", explanation);
        }
    }

    fn explanation_to_show<'a>(&self, proposal: &'a CommandProposal) -> Option<&'a str> {
        if self.options.explain {
            proposal.explanation.as_deref()
        } else {
            None
        }
    }
}

/// User turn reporting a failed execution back to the model
pub fn failure_message(outcome: &ExecutionOutcome) -> String {
    let mut message = String::from("The previous command failed. ");

    let error = present(&outcome.error);
    if let Some(error) = error {
        message.push_str("Error: ");
        message.push_str(error);
    }
    // The shell executor already appends stderr to its error text
    if let Some(stderr) = present(&outcome.stderr)
        .filter(|stderr| !error.is_some_and(|e| e.ends_with(stderr.trim())))
    {
        message.push_str("\nstderr: ");
        message.push_str(stderr);
    }
    if let Some(stdout) = present(&outcome.stdout) {
        message.push_str("\nstdout: ");
        message.push_str(stdout);
    }

    message.push_str("\n\nPlease generate a corrected command that addresses the issue.");
    message
}
