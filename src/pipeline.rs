//! Dispatch pipeline: filter, context assembly, completion call, and the
//! side effects the parsed reply asks for.

use crate::context::assemble;
use crate::error::Result;
use crate::llm::Complete;
use crate::messaging::ChatPort;
use crate::parser::{self, ParsedReply};
use crate::poll::{PollEntry, PollRegistry};
use crate::store::profiles::UserProfile;
use crate::store::{InteractionLog, ProfileStore};
use crate::{InboundEvent, InteractionKind};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// How many recent channel messages feed the context snapshot.
const SNAPSHOT_LIMIT: u8 = 5;

pub const GREETING_TEXT: &str = "Hewwo~! (✿◠‿◠) How can I help you today? 💖";
pub const APOLOGY_TEXT: &str =
    "UwU~! I ran into a little hiccup while thinking... Please try again in a bit! (｡•́︿•̀｡)💦";
pub const CONFUSED_TEXT: &str =
    "I'm a bit confused... Could you ask in a different way? (｡•́︿•̀｡)💭";
pub const SPECIAL_TEXT: &str = "I did something special for you! (｡♥‿♥｡)";

const HIGH_CHARISMA_THRESHOLD: i64 = 80;
const LOW_CHARISMA_THRESHOLD: i64 = 20;
const HIGH_CHARISMA_SUFFIX: &str = " 💖";

/// Named reaction tags the model may emit instead of a literal emoji.
const REACTION_FALLBACKS: [(&str, &str); 8] = [
    ("thumbs_up", "👍"),
    ("thumbs_down", "👎"),
    ("heart", "❤️"),
    ("thinking", "🤔"),
    ("laugh", "😂"),
    ("cry", "😢"),
    ("angry", "😠"),
    ("surprise", "😲"),
];

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?\d+>").expect("hardcoded regex"));

/// One pipeline instance serves all events, driven by the queue drain loop.
pub struct Pipeline {
    profiles: Arc<ProfileStore>,
    log: Arc<InteractionLog>,
    llm: Arc<dyn Complete>,
    port: Arc<dyn ChatPort>,
    registry: Arc<PollRegistry>,
    bot_user_id: u64,
    bot_name: String,
    system_prompt: String,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profiles: Arc<ProfileStore>,
        log: Arc<InteractionLog>,
        llm: Arc<dyn Complete>,
        port: Arc<dyn ChatPort>,
        registry: Arc<PollRegistry>,
        bot_user_id: u64,
        bot_name: String,
        system_prompt: String,
    ) -> Self {
        Self {
            profiles,
            log,
            llm,
            port,
            registry,
            bot_user_id,
            bot_name,
            system_prompt,
        }
    }

    /// Process one event end to end. Errors after the filter are answered
    /// with the fixed apology and never propagate.
    pub async fn run(&self, event: InboundEvent) {
        let Some(kind) = self.filter(&event) else {
            debug!(message_id = event.message_id, "event filtered out");
            return;
        };

        if let Err(error) = self.handle(&event, kind).await {
            warn!(%error, message_id = event.message_id, "pipeline run failed");
            if let Err(error) = self
                .port
                .reply(event.channel_id, event.message_id, APOLOGY_TEXT)
                .await
            {
                warn!(%error, "failed to send apology reply");
            }
        }
    }

    /// Decide whether an event qualifies for a response, and how. DMs and
    /// the bot's own messages never qualify; everyone else needs a mention
    /// or a name trigger. Mention wins when both apply.
    pub fn filter(&self, event: &InboundEvent) -> Option<InteractionKind> {
        if event.author_id == self.bot_user_id {
            return None;
        }
        if event.is_dm {
            return None;
        }

        let name_trigger = event
            .content
            .to_lowercase()
            .contains(&self.bot_name.to_lowercase());
        if event.mentions_bot {
            Some(InteractionKind::Mention)
        } else if name_trigger {
            Some(InteractionKind::NameTrigger)
        } else {
            None
        }
    }

    async fn handle(&self, event: &InboundEvent, kind: InteractionKind) -> Result<()> {
        let user_id = event.author_id.to_string();
        let profile = self
            .profiles
            .get_or_create(&user_id, &event.author_name)
            .await?;

        let cleaned = clean_content(&event.content, event.mentions_bot);
        self.port.start_typing(event.channel_id).await;

        // A bare mention with no text gets the canned greeting, no model call.
        if cleaned.trim().is_empty() {
            self.port
                .reply(event.channel_id, event.message_id, GREETING_TEXT)
                .await?;
            self.log
                .append(&user_id, &cleaned, Some(GREETING_TEXT), kind)
                .await?;
            return Ok(());
        }

        let history = self.log.list_recent(&user_id).await?;
        let snapshot = self
            .port
            .recent_messages(event.channel_id, event.message_id, SNAPSHOT_LIMIT)
            .await?;
        let context = assemble(&history, &snapshot);
        let system = self.augment_system_prompt(&profile, &context.summary);

        let raw = self.llm.complete(&system, &context.turns, &cleaned).await?;
        let parsed = parser::parse(&raw, &self.bot_name);
        debug!(
            message_id = event.message_id,
            delta = ?parsed.charisma_delta,
            vibe = ?parsed.vibe,
            reaction = ?parsed.reaction,
            has_poll = parsed.poll.is_some(),
            "parsed model reply"
        );

        self.apply_side_effects(event, kind, &user_id, &profile, &cleaned, &parsed)
            .await
    }

    async fn apply_side_effects(
        &self,
        event: &InboundEvent,
        kind: InteractionKind,
        user_id: &str,
        profile: &UserProfile,
        cleaned: &str,
        parsed: &ParsedReply,
    ) -> Result<()> {
        let mut score = profile.charisma;
        if let Some(delta) = parsed.charisma_delta {
            score = self.profiles.apply_score_delta(user_id, delta).await?;
            info!(user_id, delta, score, "applied charisma delta");
        }
        if let Some(vibe) = &parsed.vibe {
            self.profiles.set_vibe(user_id, vibe).await?;
            info!(user_id, vibe, "updated vibe");
        }

        let silent = parsed.text.trim().is_empty()
            && parsed.poll.is_none()
            && parsed.reaction.is_none();
        if silent {
            info!(user_id, "silent treatment, no reply sent");
            self.log.append(user_id, cleaned, None, kind).await?;
            return Ok(());
        }

        if let Some(poll) = &parsed.poll {
            let entry = PollEntry {
                question: poll.question.clone(),
                options: poll.options.clone(),
                created_at: chrono::Utc::now(),
            };
            let poll_message_id = self.port.send_poll(event.channel_id, &entry).await?;
            self.registry.register(poll_message_id, entry);
            info!(poll_message_id, question = %poll.question, "created poll");

            let confirmation = format!("Created vote: {}", poll.question);
            self.log
                .append(user_id, cleaned, Some(&confirmation), kind)
                .await?;
            return Ok(());
        }

        if let Some(tag) = &parsed.reaction {
            self.apply_reaction(event, tag).await;
        }

        let text = apply_persona(&parsed.text, score);
        let final_text = if text.trim().is_empty() {
            if parsed.reaction.is_some() {
                SPECIAL_TEXT.to_string()
            } else {
                CONFUSED_TEXT.to_string()
            }
        } else {
            text
        };

        let max_len = self.port.max_message_len();
        if final_text.len() <= max_len {
            self.port
                .reply(event.channel_id, event.message_id, &final_text)
                .await?;
        } else {
            for chunk in chunk_text(&final_text, max_len) {
                self.port.send(event.channel_id, &chunk).await?;
            }
        }

        self.log
            .append(user_id, cleaned, Some(&final_text), kind)
            .await
    }

    /// Reactions are best-effort: a bad emoji falls back to the named-tag
    /// table, and failures never abort the reply.
    async fn apply_reaction(&self, event: &InboundEvent, tag: &str) {
        if self
            .port
            .react(event.channel_id, event.message_id, tag)
            .await
            .is_ok()
        {
            return;
        }

        let fallback = REACTION_FALLBACKS
            .iter()
            .find(|(name, _)| *name == tag.to_lowercase())
            .map(|(_, emoji)| *emoji);
        if let Some(emoji) = fallback {
            if let Err(error) = self.port.react(event.channel_id, event.message_id, emoji).await {
                warn!(%error, tag, "fallback reaction failed");
            }
        } else {
            warn!(tag, "reaction failed with no known fallback");
        }
    }

    fn augment_system_prompt(&self, profile: &UserProfile, summary: &str) -> String {
        let mut prompt = self.system_prompt.clone();
        prompt.push_str(&format!(
            "\n\n## Current User Context:\n\
             - Username: {}\n\
             - Current Charisma: {}/100\n\
             - Current Vibe: {}\n\
             - Total Messages: {}\n\n\
             ## Charisma Management:\n\
             - Use **CHARISMA:** +X or **CHARISMA:** -X to adjust their charisma\n\
             - Engaging/kind messages: +1 to +5, boring messages: -1 to 0, rude: -3 to -10\n\
             - You can change their vibe with **VIBE:** new_vibe\n\n\
             Never start your response with \"{}:\" or any username prefix. Speak directly.",
            profile.username, profile.charisma, profile.vibe, profile.total_messages, self.bot_name,
        ));

        if !summary.is_empty() {
            prompt.push_str(&format!(
                "\n\n## Recent Channel Conversation:\n{summary}\n\n\
                 This shows who said what recently. Use it to follow the conversation flow, \
                 but never prefix your reply with a name.",
            ));
        }

        prompt
    }
}

/// Strip the bot's mention token out of the text when the event was a
/// mention. Name-trigger text passes through untouched.
fn clean_content(content: &str, mentioned: bool) -> String {
    if mentioned {
        MENTION_RE.replace_all(content, "").trim().to_string()
    } else {
        content.to_string()
    }
}

/// Persona tone shaping with the post-update score: a high score earns the
/// decorative suffix, a low score gets cut to the first sentence.
fn apply_persona(text: &str, score: i64) -> String {
    if score >= HIGH_CHARISMA_THRESHOLD {
        format!("{text}{HIGH_CHARISMA_SUFFIX}")
    } else if score <= LOW_CHARISMA_THRESHOLD {
        match text.split('.').next() {
            Some(first) if !first.trim().is_empty() => first.to_string(),
            _ => text.to_string(),
        }
    } else {
        text.to_string()
    }
}

/// Split on char boundaries into chunks of at most `max` bytes.
fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > max {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
