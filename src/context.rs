//! Prompt context assembly: per-user history plus a redacted channel
//! snapshot.
//!
//! Speaker names are deliberately kept out of the turn list; the model
//! imitates whatever it sees in the history, so names only appear in the
//! human-readable summary that goes into the instruction text.

use crate::ChannelMessage;
use crate::store::interactions::InteractionRecord;

/// Role tag for one prompt turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged prompt turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Assembled context ready for the completion call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Ordered turn history: the user's own interactions, then the channel
    /// snapshot, both oldest first.
    pub turns: Vec<ChatTurn>,
    /// `speaker: "text"` lines for the instruction text. This is the only
    /// place speaker names survive.
    pub summary: String,
}

/// Build the prompt context for one pipeline run.
///
/// `history` is the user's own interaction log, oldest first. An interaction
/// that was intentionally left unanswered contributes a user turn but no
/// assistant turn. `snapshot` is the channel's recent messages, oldest first.
pub fn assemble(history: &[InteractionRecord], snapshot: &[ChannelMessage]) -> AssembledContext {
    let mut turns = Vec::with_capacity(history.len() * 2 + snapshot.len());

    for record in history {
        turns.push(ChatTurn {
            role: Role::User,
            content: record.user_message.clone(),
        });
        if let Some(response) = &record.bot_response {
            turns.push(ChatTurn {
                role: Role::Assistant,
                content: response.clone(),
            });
        }
    }

    for message in snapshot {
        turns.push(ChatTurn {
            role: if message.from_bot { Role::Assistant } else { Role::User },
            content: message.content.clone(),
        });
    }

    let summary = snapshot
        .iter()
        .map(|message| format!("{}: \"{}\"", message.author_name, message.content))
        .collect::<Vec<_>>()
        .join("\n");

    AssembledContext { turns, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, bot: Option<&str>) -> InteractionRecord {
        InteractionRecord {
            user_message: user.to_string(),
            bot_response: bot.map(String::from),
            kind: crate::InteractionKind::Mention,
            created_at: chrono::Utc::now(),
        }
    }

    fn channel_message(author: &str, from_bot: bool, content: &str) -> ChannelMessage {
        ChannelMessage {
            author_name: author.to_string(),
            from_bot,
            content: content.to_string(),
        }
    }

    #[test]
    fn history_turns_come_before_channel_turns() {
        let history = vec![record("hi", Some("hello!"))];
        let snapshot = vec![channel_message("alice", false, "what's up")];

        let context = assemble(&history, &snapshot);
        assert_eq!(context.turns.len(), 3);
        assert_eq!(context.turns[0].role, Role::User);
        assert_eq!(context.turns[0].content, "hi");
        assert_eq!(context.turns[1].role, Role::Assistant);
        assert_eq!(context.turns[1].content, "hello!");
        assert_eq!(context.turns[2].role, Role::User);
        assert_eq!(context.turns[2].content, "what's up");
    }

    #[test]
    fn unanswered_interaction_has_no_assistant_turn() {
        let history = vec![record("ping", None), record("pong?", Some("pong!"))];
        let context = assemble(&history, &[]);
        assert_eq!(context.turns.len(), 3);
        assert_eq!(context.turns[0].content, "ping");
        assert_eq!(context.turns[1].role, Role::User);
    }

    #[test]
    fn channel_turns_carry_no_speaker_names() {
        let snapshot = vec![
            channel_message("alice", false, "hello"),
            channel_message("botty", true, "hi alice"),
        ];
        let context = assemble(&[], &snapshot);
        assert!(!context.turns[0].content.contains("alice"));
        assert_eq!(context.turns[1].role, Role::Assistant);
    }

    #[test]
    fn summary_lists_speakers_in_order() {
        let snapshot = vec![
            channel_message("alice", false, "hello"),
            channel_message("bob", false, "yo"),
        ];
        let context = assemble(&[], &snapshot);
        assert_eq!(context.summary, "alice: \"hello\"\nbob: \"yo\"");
    }

    #[test]
    fn empty_inputs_yield_empty_context() {
        let context = assemble(&[], &[]);
        assert!(context.turns.is_empty());
        assert!(context.summary.is_empty());
    }
}
