use super::ConversationTurn;
use crate::config::Config;
use crate::util::truncate_str;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Failures talking to the model backend. All of them end the session.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No API key configured. Run 'amy --setup' to get started.")]
    MissingApiKey,
    #[error("Failed to generate command: {0}")]
    Transport(String),
    #[error("Failed to generate command: {message}")]
    Api { status: u16, message: String },
    #[error("Failed to generate command: could not parse model response ({0})")]
    InvalidEnvelope(String),
    #[error("Failed to generate command: {0}")]
    EmptyResponse(&'static str),
}

/// Text-completion backend driven by the session.
///
/// Implementations return the raw text of the top choice; interpreting it is
/// the parser's job.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        conversation: &[ConversationTurn],
        include_explanation: bool,
    ) -> Result<String, ModelError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

/// Chat-completions client for OpenAI and compatible endpoints
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(format!("amy-cli/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Client built from persisted config and the resolved API key
    pub fn from_config(config: &Config) -> Result<Self, ModelError> {
        Self::with_resolved_key(config.get_api_key(), config)
    }

    fn with_resolved_key(api_key: Option<String>, config: &Config) -> Result<Self, ModelError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ModelError::MissingApiKey)?;
        Self::new(api_key, config).map_err(|e| ModelError::Transport(e.to_string()))
    }

    async fn send_with_retry(&self, body: &ChatRequest<'_>) -> Result<String, ModelError> {
        let mut retry_count = 0;

        loop {
            let response = match self
                .http
                .post(&self.base_url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        sleep_before_retry(backoff_secs(retry_count), retry_count).await;
                        continue;
                    }
                    return Err(map_transport_error(err));
                }
            };

            let status = response.status();
            let text = response.text().await.map_err(map_transport_error)?;

            if status.is_success() {
                return Ok(text);
            }

            let retryable = status.as_u16() == 429 || status.is_server_error();
            if retryable && retry_count < MAX_RETRIES {
                retry_count += 1;
                let wait = parse_retry_after(&text).unwrap_or_else(|| backoff_secs(retry_count));
                sleep_before_retry(wait, retry_count).await;
                continue;
            }

            let message = match status.as_u16() {
                401 => "Invalid API key. Run 'amy --setup' to update it.".to_string(),
                429 => format!(
                    "Rate limited by the model API after {} retries. Try again in a few minutes.",
                    retry_count
                ),
                500..=599 => format!(
                    "Model API server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, sanitize_api_response(&text)),
            };
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(
        &self,
        conversation: &[ConversationTurn],
        _include_explanation: bool,
    ) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: conversation,
            temperature: self.temperature,
        };

        let body = self.send_with_retry(&request).await?;
        extract_content(&body)
    }
}

/// Pull the top choice's text out of a chat-completions envelope
fn extract_content(body: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::InvalidEnvelope(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(ModelError::EmptyResponse("No choices returned from model API"))?;

    choice
        .message
        .and_then(|m| m.content)
        .filter(|content| !content.is_empty())
        .ok_or(ModelError::EmptyResponse("No message content in model response"))
}

async fn sleep_before_retry(secs: u64, attempt: u32) {
    tracing::warn!(
        wait_secs = secs,
        attempt,
        max = MAX_RETRIES,
        "model API busy, retrying"
    );
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Extract retry-after hint from the response body (if present)
fn parse_retry_after(text: &str) -> Option<u64> {
    // Look for patterns like "retry after X seconds" or "try again in Xs"
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry").or_else(|| text_lower.find("try again"))?;
    let after = &text_lower[pos..];
    for word in after.split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word
            .trim_matches(|c: char| !c.is_numeric())
            .parse::<u64>()
        {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let secs = INITIAL_BACKOFF_MS.saturating_mul(factor) / 1000;
    secs.max(1)
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn map_transport_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Transport("Model API request timed out. Please try again.".to_string())
    } else if err.is_connect() {
        ModelError::Transport(
            "Could not connect to the model API. Check your network and try again.".to_string(),
        )
    } else {
        ModelError::Transport(err.to_string())
    }
}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(response details redacted - may contain sensitive data)".to_string();
    }
    truncated.to_string()
}
