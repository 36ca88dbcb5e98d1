//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use std::path::PathBuf;

/// Vibebot configuration, loaded from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (SQLite file lives here).
    pub data_dir: PathBuf,

    /// Discord bot token.
    pub discord_token: String,

    /// Name token that triggers the bot when it appears in message text,
    /// independent of platform mention syntax. Matched case-insensitively.
    pub bot_name: String,

    /// Path to the persona system prompt file, loaded once at startup.
    pub prompt_path: PathBuf,

    /// Completion endpoint configuration.
    pub llm: LlmConfig,

    /// Inbound queue behavior.
    pub queue: QueueConfig,

    /// Poll registry behavior.
    pub poll: PollConfig,

    /// Interactions webhook endpoint. Only served when a public key is set.
    pub webhook: WebhookConfig,
}

/// Completion endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Inbound event queue configuration.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum queued events before new arrivals are dropped.
    pub capacity: usize,
    /// Fixed delay between dequeues, to stay under Discord's rate limits.
    pub drain_delay: std::time::Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            drain_delay: std::time::Duration::from_secs(1),
        }
    }
}

/// Poll registry configuration.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Polls older than this are evicted by the periodic sweep.
    pub max_age: std::time::Duration,
    /// How often the sweep runs.
    pub sweep_interval: std::time::Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_age: std::time::Duration::from_secs(60 * 60),
            sweep_interval: std::time::Duration::from_secs(5 * 60),
        }
    }
}

/// Interactions webhook configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Hex-encoded ed25519 public key for request-signature verification.
    pub public_key: Option<String>,
    pub application_id: Option<String>,
    pub port: u16,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("vibebot"))
            .unwrap_or_else(|| PathBuf::from("./data"));

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

        let discord_token = std::env::var("DISCORD_TOKEN")
            .map_err(|_| ConfigError::MissingVar("DISCORD_TOKEN".into()))?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".into()))?;

        let llm = LlmConfig {
            api_key,
            base_url: std::env::var("VIBEBOT_BASE_URL")
                .unwrap_or_else(|_| "https://api.moonshot.ai/v1".into()),
            model: std::env::var("VIBEBOT_MODEL")
                .unwrap_or_else(|_| "kimi-k2-0711-preview".into()),
            max_tokens: 8192,
            temperature: 0.7,
        };

        let bot_name = std::env::var("VIBEBOT_NAME").unwrap_or_else(|_| "vibebot".into());
        if bot_name.trim().is_empty() {
            return Err(ConfigError::Invalid("VIBEBOT_NAME must not be empty".into()).into());
        }

        let prompt_path = std::env::var("VIBEBOT_PROMPT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("prompts/system.md"));

        let port = match std::env::var("VIBEBOT_HTTP_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid VIBEBOT_HTTP_PORT: {raw}")))?,
            Err(_) => 8787,
        };

        let webhook = WebhookConfig {
            public_key: std::env::var("DISCORD_PUBLIC_KEY").ok(),
            application_id: std::env::var("DISCORD_APPLICATION_ID").ok(),
            port,
        };

        Ok(Self {
            data_dir,
            discord_token,
            bot_name,
            prompt_path,
            llm,
            queue: QueueConfig::default(),
            poll: PollConfig::default(),
            webhook,
        })
    }

    /// Get the SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("vibebot.db")
    }

    /// Load the persona system prompt, falling back to a built-in default
    /// when the file is missing so the bot still comes up.
    pub fn load_system_prompt(&self) -> String {
        match std::fs::read_to_string(&self.prompt_path) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    path = %self.prompt_path.display(),
                    %error,
                    "failed to load system prompt, using built-in default"
                );
                "You are a friendly Discord bot assistant. Be warm, concise, and helpful.".into()
            }
        }
    }
}
