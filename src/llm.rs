//! Completion endpoint client (OpenAI-compatible chat completions).

use crate::config::LlmConfig;
use crate::context::ChatTurn;
use crate::error::{LlmError, Result};
use async_trait::async_trait;

/// Seam between the pipeline and the model provider. The pipeline only ever
/// sees this trait, so tests can substitute a canned implementation.
#[async_trait]
pub trait Complete: Send + Sync {
    /// One completion call: system prompt, prior turns, then the current
    /// user message. Returns the raw model text, unparsed.
    async fn complete(&self, system: &str, turns: &[ChatTurn], user: &str) -> Result<String>;
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct CompletionClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl CompletionClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Complete for CompletionClient {
    async fn complete(&self, system: &str, turns: &[ChatTurn], user: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(turns.len() + 2);
        messages.push(serde_json::json!({
            "role": "system",
            "content": system,
        }));
        for turn in turns {
            messages.push(serde_json::json!({
                "role": turn.role.as_str(),
                "content": turn.content,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": user,
        }));

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_body(&text),
            }
            .into());
        }

        let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            LlmError::Transport(format!(
                "completion response is not valid JSON: {e}\nBody: {}",
                truncate_body(&text)
            ))
        })?;

        Ok(extract_content(&parsed))
    }
}

/// Pull the reply text out of a chat-completions response. A missing or
/// empty content field comes back as an empty string; the response parser
/// substitutes its filler for empty text, so this is not an error.
fn extract_content(response: &serde_json::Value) -> String {
    response["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i <= MAX)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        format!("{}... ({} bytes)", &body[..cut], body.len())
    }
}
