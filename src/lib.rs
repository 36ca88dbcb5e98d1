//! Vibebot: a persona Discord bot that tracks a per-user charisma score and
//! mood, and lets the model drive side effects (reactions, polls, score
//! changes) through structured directives in its replies.

pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod parser;
pub mod pipeline;
pub mod poll;
pub mod queue;
pub mod server;
pub mod store;

pub use error::{Error, Result};

/// An inbound chat event, already lifted out of platform types so the queue
/// and pipeline never touch the gateway SDK directly.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Platform message id, also the dedup key for at-least-once delivery.
    pub message_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub is_dm: bool,
    /// Whether the message explicitly mentions the bot account.
    pub mentions_bot: bool,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// How an inbound event qualified for a response.
///
/// `Reply` and `Dm` are not produced by the current filter (DMs are dropped,
/// replies alone don't qualify) but remain valid stored kinds; older rows in
/// the interaction log may carry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Mention,
    Reply,
    Dm,
    NameTrigger,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::Mention => "mention",
            InteractionKind::Reply => "reply",
            InteractionKind::Dm => "dm",
            InteractionKind::NameTrigger => "name",
        }
    }

    /// Parse a stored kind column. Unknown values fall back to `NameTrigger`
    /// rather than failing the row read.
    pub fn from_db(value: &str) -> Self {
        match value {
            "mention" => InteractionKind::Mention,
            "reply" => InteractionKind::Reply,
            "dm" => InteractionKind::Dm,
            _ => InteractionKind::NameTrigger,
        }
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message from the channel's recent history, as fetched for context
/// assembly. Speaker names live here but are redacted from the turn list;
/// only the summary string sees them.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub author_name: String,
    pub from_bot: bool,
    pub content: String,
}
