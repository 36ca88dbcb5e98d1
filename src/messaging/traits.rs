//! Capabilities the pipeline needs from a chat platform.

use crate::error::Result;
use crate::{ChannelMessage, poll::PollEntry};
use async_trait::async_trait;

/// What the dispatch pipeline is allowed to do to the outside world. Keeping
/// this narrow keeps the pipeline testable with a recording fake.
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Send `text` as a threaded reply to an existing message.
    async fn reply(&self, channel_id: u64, message_id: u64, text: &str) -> Result<()>;

    /// Send a plain channel message. Returns the new message's id.
    async fn send(&self, channel_id: u64, text: &str) -> Result<u64>;

    /// Post a poll message with a vote menu. Returns the poll message's id.
    async fn send_poll(&self, channel_id: u64, entry: &PollEntry) -> Result<u64>;

    /// Add an emoji reaction to a message.
    async fn react(&self, channel_id: u64, message_id: u64, emoji: &str) -> Result<()>;

    /// Fetch the channel's most recent messages, oldest first, excluding
    /// `before_message_id` itself.
    async fn recent_messages(
        &self,
        channel_id: u64,
        before_message_id: u64,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>>;

    /// Show a typing indicator while the completion call runs. Failures here
    /// are cosmetic, so the port logs and swallows them.
    async fn start_typing(&self, channel_id: u64);

    /// Per-message length ceiling for this platform.
    fn max_message_len(&self) -> usize {
        2000
    }
}
