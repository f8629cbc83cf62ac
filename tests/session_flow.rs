//! End-to-end session scenarios through the public library API.
//!
//! The model and confirmation prompt are scripted; commands run through the
//! real shell executor so failure records carry genuine shell diagnostics.

#![cfg(unix)]

use amy::confirm::ConfirmationGate;
use amy::environment::EnvironmentContext;
use amy::executor::ShellExecutor;
use amy::history::FailureHistoryStore;
use amy::llm::{ConversationTurn, ModelClient, ModelError, Role};
use amy::session::{SessionContext, SessionController, SessionOptions, SessionOutcome};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Scripted collaborators ─────────────────────────────────────────────

struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn rounds(&self) -> Vec<Vec<ConversationTurn>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        conversation: &[ConversationTurn],
        _include_explanation: bool,
    ) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(conversation.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ModelError::EmptyResponse("No choices returned from model API"))
    }
}

struct AlwaysApprove;

#[async_trait]
impl ConfirmationGate for AlwaysApprove {
    async fn confirm(&self, _command: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

fn environment(cwd: &TempDir) -> EnvironmentContext {
    EnvironmentContext {
        platform: "linux".to_string(),
        release: "6.1.0".to_string(),
        arch: "x64".to_string(),
        shell: "sh".to_string(),
        cwd: cwd.path().display().to_string(),
        is_root: false,
    }
}

fn session(
    tmp: &TempDir,
    store: &FailureHistoryStore,
    model: Arc<ScriptedModel>,
    options: SessionOptions,
) -> SessionController {
    SessionController::new(
        SessionContext {
            environment: environment(tmp),
            model,
            confirmation: Arc::new(AlwaysApprove),
            executor: Arc::new(ShellExecutor),
            history: store.clone(),
        },
        options,
    )
}

// ── Scenarios ──────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_command_is_persisted_and_corrected() {
    let tmp = TempDir::new().unwrap();
    let store = FailureHistoryStore::new(tmp.path().join("command-history.json"));
    let model = ScriptedModel::new(&[
        r#"{"command": "amy-missing-tree-tool -L 2", "executable": true}"#,
        "```json\n{\"command\": \"printf done\", \"executable\": true}\n```",
    ]);

    let mut controller = session(&tmp, &store, model.clone(), SessionOptions::default());
    let outcome = controller.run("show directory tree").await.unwrap();

    assert!(matches!(outcome, SessionOutcome::Succeeded { attempts: 2, .. }));

    let history = store.load();
    assert_eq!(history.len(), 1);
    let record = &history.failures[0];
    assert_eq!(record.user_intent, "show directory tree");
    assert_eq!(record.failed_command, "amy-missing-tree-tool -L 2");
    assert!(record
        .error
        .starts_with("Command failed with exit code 127: amy-missing-tree-tool -L 2"));

    let rounds = model.rounds();
    assert_eq!(rounds.len(), 2);
    let retry_turn = rounds[1].last().unwrap();
    assert_eq!(retry_turn.role, Role::User);
    assert!(retry_turn.content.starts_with("The previous command failed. Error: "));
    // The shell diagnosis rides on the error line only
    assert!(!retry_turn.content.contains("\nstderr: "));
    assert_eq!(retry_turn.content.matches("not found").count(), 1);
}

#[tokio::test]
async fn later_sessions_learn_from_earlier_failures() {
    let tmp = TempDir::new().unwrap();
    let store = FailureHistoryStore::new(tmp.path().join("command-history.json"));

    let first = ScriptedModel::new(&["amy-missing-tree-tool", "true"]);
    session(&tmp, &store, first, SessionOptions::default())
        .run("show directory tree")
        .await
        .unwrap();

    let second = ScriptedModel::new(&[r#"{"command": "Hi! What can I do?", "executable": false}"#]);
    let outcome = session(&tmp, &store, second.clone(), SessionOptions::default())
        .run("hello")
        .await
        .unwrap();

    assert!(matches!(outcome, SessionOutcome::NonExecutable(_)));
    let system = &second.rounds()[0][0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("LEARNING FROM PAST FAILURES"));
    assert!(system
        .content
        .contains("1. Intent: \"show directory tree\"\n   Failed Command: amy-missing-tree-tool\n"));
}

#[tokio::test]
async fn exhausted_model_surfaces_session_error() {
    let tmp = TempDir::new().unwrap();
    let store = FailureHistoryStore::new(tmp.path().join("command-history.json"));
    let model = ScriptedModel::new(&["exit 1"]);

    let err = session(
        &tmp,
        &store,
        model,
        SessionOptions {
            force: true,
            explain: false,
        },
    )
    .run("fail once")
    .await
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Session error: Failed to generate command: No choices returned from model API"
    );
    assert_eq!(store.load().len(), 1);
}
