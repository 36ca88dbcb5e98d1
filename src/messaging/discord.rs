//! Discord gateway adapter: serenity event handler feeding the inbound
//! queue, plus the [`ChatPort`] implementation over the REST API.

use crate::error::Result;
use crate::messaging::traits::ChatPort;
use crate::poll::{PollEntry, PollRegistry, option_marker, resolve_option};
use crate::queue::{EventQueue, PushOutcome};
use crate::{ChannelMessage, InboundEvent};
use async_trait::async_trait;
use serenity::Client;
use serenity::all::{
    ActivityData, ChannelId, ComponentInteraction, ComponentInteractionDataKind, Context,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage, CreateSelectMenu,
    CreateSelectMenuKind, CreateSelectMenuOption, EventHandler, GatewayIntents, GetMessages,
    Interaction, Message, MessageId, MessageReference, MessageUpdateEvent, ReactionType, Ready,
};
use serenity::builder::CreateActionRow;
use serenity::http::Http;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Custom id prefix carried by every poll select menu. The suffix is a
/// creation timestamp; lookups go by message id, so it only has to be
/// unique enough to route the interaction.
const VOTE_CUSTOM_ID_PREFIX: &str = "vote_";

/// How long a vote acknowledgement may take before we roll back the
/// selection claim so the voter's retry isn't swallowed.
const VOTE_ACK_TIMEOUT: Duration = Duration::from_millis(2500);

/// Serenity event handler. Converts gateway messages into [`InboundEvent`]s
/// for the queue and services poll votes directly.
pub struct DiscordGateway {
    queue: Arc<EventQueue>,
    registry: Arc<PollRegistry>,
    bot_name: String,
}

impl DiscordGateway {
    pub fn new(queue: Arc<EventQueue>, registry: Arc<PollRegistry>, bot_name: String) -> Self {
        Self {
            queue,
            registry,
            bot_name,
        }
    }

    /// Build and run the gateway client. Returns when the connection dies.
    pub async fn run(self, token: &str) -> Result<()> {
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let mut client = Client::builder(token, intents).event_handler(self).await?;
        client.start().await?;
        Ok(())
    }

    fn enqueue(&self, event: InboundEvent) {
        let message_id = event.message_id;
        match self.queue.push(event) {
            PushOutcome::Queued => {
                debug!(message_id, queue_len = self.queue.len(), "queued inbound event");
            }
            PushOutcome::Duplicate => {
                debug!(message_id, "dropped duplicate inbound event");
            }
            PushOutcome::Overflow => {
                warn!(message_id, "inbound queue full, dropping event");
            }
        }
    }

    fn has_trigger(&self, event: &InboundEvent) -> bool {
        event.mentions_bot
            || event
                .content
                .to_lowercase()
                .contains(&self.bot_name.to_lowercase())
    }

    async fn handle_vote(&self, ctx: &Context, component: &ComponentInteraction) {
        let values = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => values,
            _ => return,
        };
        let Some(value) = values.first() else { return };
        if component.user.bot {
            return;
        }

        let poll_message_id = component.message.id.get();
        let event_id = component.id.get();
        let voter_id = component.user.id.get();

        // At-least-once delivery: claim the interaction before touching
        // anything, and let redeliveries fall through silently.
        if !self.registry.mark_selection(event_id, voter_id) {
            debug!(event_id, voter_id, "dropping redelivered vote interaction");
            return;
        }

        let Some(entry) = self.registry.get(poll_message_id) else {
            let response = CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content("This vote is no longer active.")
                    .ephemeral(true),
            );
            // Same ack deadline as the happy path: an unacknowledged
            // interaction gets retried by the platform, so the claim has to
            // be released or the retry is swallowed as a duplicate.
            let ack = tokio::time::timeout(
                VOTE_ACK_TIMEOUT,
                component.create_response(&ctx.http, response),
            )
            .await;
            if !matches!(ack, Ok(Ok(()))) {
                warn!(poll_message_id, voter_id, "failed to answer vote on expired poll");
                self.registry.release_selection(event_id, voter_id);
            }
            return;
        };

        let Some(option) = resolve_option(&entry, value) else {
            debug!(poll_message_id, value, "vote for unknown option");
            return;
        };

        let confirmation = format!(
            "✨ {} voted for: **{}**",
            component.user.display_name(),
            option
        );
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(confirmation),
        );

        // If the acknowledgement doesn't land in time the interaction token
        // dies on Discord's side, so roll back the claim to let a retry in.
        let ack = tokio::time::timeout(
            VOTE_ACK_TIMEOUT,
            component.create_response(&ctx.http, response),
        )
        .await;

        match ack {
            Ok(Ok(())) => {
                info!(poll_message_id, voter_id, option, "recorded poll vote");
            }
            Ok(Err(error)) => {
                warn!(%error, poll_message_id, voter_id, "vote acknowledgement failed");
                self.registry.release_selection(event_id, voter_id);
            }
            Err(_) => {
                warn!(poll_message_id, voter_id, "vote acknowledgement timed out");
                self.registry.release_selection(event_id, voter_id);
            }
        }
    }
}

#[async_trait]
impl EventHandler for DiscordGateway {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(username = %ready.user.name, user_id = ready.user.id.get(), "gateway connected");
        ctx.set_activity(Some(ActivityData::playing("with the vibes")));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let bot_id = ctx.cache.current_user().id;
        self.enqueue(inbound_event(&msg, bot_id.get()));
    }

    /// Edits only matter when another bot edits a trigger into a message that
    /// didn't have one. Human edits and edits that already triggered are
    /// ignored, as are edits where the old content is unavailable.
    async fn message_update(
        &self,
        ctx: Context,
        old: Option<Message>,
        new: Option<Message>,
        _event: MessageUpdateEvent,
    ) {
        let (Some(old), Some(new)) = (old, new) else {
            return;
        };
        if !new.author.bot || old.content == new.content {
            return;
        }

        let bot_id = ctx.cache.current_user().id.get();
        let old_event = inbound_event(&old, bot_id);
        let new_event = inbound_event(&new, bot_id);
        if self.has_trigger(&new_event) && !self.has_trigger(&old_event) {
            debug!(message_id = new_event.message_id, "bot edit introduced a trigger");
            self.enqueue(new_event);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            if component.data.custom_id.starts_with(VOTE_CUSTOM_ID_PREFIX) {
                self.handle_vote(&ctx, &component).await;
            }
        }
    }
}

fn inbound_event(msg: &Message, bot_id: u64) -> InboundEvent {
    InboundEvent {
        message_id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        author_id: msg.author.id.get(),
        author_name: msg.author.name.clone(),
        author_is_bot: msg.author.bot,
        is_dm: msg.guild_id.is_none(),
        mentions_bot: msg.mentions.iter().any(|user| user.id.get() == bot_id),
        content: msg.content.clone(),
        timestamp: chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(chrono::Utc::now),
    }
}

/// [`ChatPort`] over Discord's REST API.
pub struct DiscordPort {
    http: Arc<Http>,
}

impl DiscordPort {
    pub fn new(http: Arc<Http>) -> Arc<Self> {
        Arc::new(Self { http })
    }
}

#[async_trait]
impl ChatPort for DiscordPort {
    async fn reply(&self, channel_id: u64, message_id: u64, text: &str) -> Result<()> {
        let reference =
            MessageReference::from((ChannelId::new(channel_id), MessageId::new(message_id)));
        ChannelId::new(channel_id)
            .send_message(
                &self.http,
                CreateMessage::new().content(text).reference_message(reference),
            )
            .await?;
        Ok(())
    }

    async fn send(&self, channel_id: u64, text: &str) -> Result<u64> {
        let message = ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().content(text))
            .await?;
        Ok(message.id.get())
    }

    async fn send_poll(&self, channel_id: u64, entry: &PollEntry) -> Result<u64> {
        let menu_options = entry
            .options
            .iter()
            .enumerate()
            .map(|(index, option)| {
                CreateSelectMenuOption::new(option.clone(), format!("option_{index}"))
                    .emoji(ReactionType::Unicode(option_marker(index).to_string()))
            })
            .collect();

        let custom_id = format!(
            "{VOTE_CUSTOM_ID_PREFIX}{}",
            chrono::Utc::now().timestamp_millis()
        );
        let menu = CreateSelectMenu::new(
            custom_id,
            CreateSelectMenuKind::String {
                options: menu_options,
            },
        )
        .placeholder("Cast your vote");

        let message = ChannelId::new(channel_id)
            .send_message(
                &self.http,
                CreateMessage::new()
                    .content(poll_body(entry))
                    .components(vec![CreateActionRow::SelectMenu(menu)]),
            )
            .await?;
        Ok(message.id.get())
    }

    async fn react(&self, channel_id: u64, message_id: u64, emoji: &str) -> Result<()> {
        self.http
            .create_reaction(
                ChannelId::new(channel_id),
                MessageId::new(message_id),
                &ReactionType::Unicode(emoji.to_string()),
            )
            .await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel_id: u64,
        before_message_id: u64,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>> {
        let fetched = ChannelId::new(channel_id)
            .messages(
                &self.http,
                GetMessages::new()
                    .before(MessageId::new(before_message_id))
                    .limit(limit),
            )
            .await?;

        // Discord returns newest first.
        let mut messages: Vec<ChannelMessage> = fetched
            .iter()
            .map(|msg| ChannelMessage {
                author_name: msg.author.name.clone(),
                from_bot: msg.author.bot,
                content: msg.content.clone(),
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn start_typing(&self, channel_id: u64) {
        if let Err(error) = ChannelId::new(channel_id).broadcast_typing(&self.http).await {
            debug!(%error, channel_id, "failed to broadcast typing");
        }
    }
}

/// Render the poll message body above the vote menu.
pub fn poll_body(entry: &PollEntry) -> String {
    let mut body = format!("📊 **{}**\n\n", entry.question);
    for (index, option) in entry.options.iter().enumerate() {
        body.push_str(&format!("{} {}\n", option_marker(index), option));
    }
    body.push_str("\n*Use the dropdown below to vote!*");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn poll_body_numbers_options_in_order() {
        let entry = PollEntry {
            question: "pizza or tacos?".to_string(),
            options: vec!["pizza".to_string(), "tacos".to_string()],
            created_at: Utc::now(),
        };
        let body = poll_body(&entry);
        assert!(body.starts_with("📊 **pizza or tacos?**"));
        assert!(body.contains("1\u{fe0f}\u{20e3} pizza"));
        assert!(body.contains("2\u{fe0f}\u{20e3} tacos"));
        assert!(body.contains("dropdown below"));
    }
}
