//! Persistent failure history
//!
//! Stores failed commands in `<config dir>/command-history.json` so later
//! sessions can steer the model away from repeating them:
//! - append-only, oldest entries evicted first once the cap is exceeded
//! - a missing or unreadable file is treated as an empty history
//! - read-modify-write without locking; concurrent processes may lose updates

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum number of failure records kept on disk
pub const MAX_HISTORY_SIZE: usize = 200;

const HISTORY_FILE: &str = "command-history.json";

/// One failed execution: what the user asked for, what ran, and why it failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub user_intent: String,
    pub failed_command: String,
    pub error: String,
}

impl FailureRecord {
    pub fn new(
        user_intent: impl Into<String>,
        failed_command: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            user_intent: user_intent.into(),
            failed_command: failed_command.into(),
            error: error.into(),
        }
    }
}

/// Chronological list of failures (oldest first)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureHistory {
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
}

impl FailureHistory {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Append a record, evicting the oldest entries beyond the cap
    pub fn push(&mut self, record: FailureRecord) {
        self.failures.push(record);
        self.truncate_to_cap();
    }

    fn truncate_to_cap(&mut self) {
        if self.failures.len() > MAX_HISTORY_SIZE {
            let excess = self.failures.len() - MAX_HISTORY_SIZE;
            self.failures.drain(..excess);
        }
    }
}

/// File-backed store for [`FailureHistory`]
#[derive(Debug, Clone)]
pub struct FailureHistoryStore {
    path: PathBuf,
}

impl FailureHistoryStore {
    /// Store backed by an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location inside the config directory
    pub fn at_default_location() -> Option<Self> {
        crate::config::config_dir().map(|dir| Self::new(dir.join(HISTORY_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the history, or an empty one if nothing usable is on disk
    pub fn load(&self) -> FailureHistory {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return FailureHistory::default();
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "Error loading command history");
                return FailureHistory::default();
            }
        };

        match serde_json::from_str::<FailureHistory>(&content) {
            Ok(mut history) => {
                history.truncate_to_cap();
                history
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "Error loading command history");
                FailureHistory::default()
            }
        }
    }

    /// Append one failure and write the capped history back to disk
    pub fn record(&self, user_intent: &str, failed_command: &str, error: &str) -> Result<()> {
        let mut history = self.load();
        history.push(FailureRecord::new(user_intent, failed_command, error));
        self.save(&history)
    }

    fn save(&self, history: &FailureHistory) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create history directory '{}'", dir.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(history).context("Failed to serialize command history")?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).with_context(|| {
            format!("Failed to create temp history file '{}'", tmp_path.display())
        })?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write history file '{}'", tmp_path.display()))?;

        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err).with_context(|| {
                format!("Failed to finalize history file '{}'", self.path.display())
            });
        }
        Ok(())
    }
}
