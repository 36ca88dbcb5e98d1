//! In-memory registry of active polls and vote-selection dedup.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Selection-dedup memory high-water mark. Cleared back down periodically so
/// a long-lived process doesn't accumulate ids forever.
const SELECTION_CAP: usize = 1000;

/// Emoji markers for poll options, in display order. Polls with more options
/// than markers fall back to the plain diamond.
pub const OPTION_EMOJI: [&str; 5] = ["1\u{fe0f}\u{20e3}", "2\u{fe0f}\u{20e3}", "3\u{fe0f}\u{20e3}", "4\u{fe0f}\u{20e3}", "5\u{fe0f}\u{20e3}"];
pub const OPTION_EMOJI_FALLBACK: &str = "🔹";

/// Marker for the option at `index` (zero-based).
pub fn option_marker(index: usize) -> &'static str {
    OPTION_EMOJI.get(index).copied().unwrap_or(OPTION_EMOJI_FALLBACK)
}

/// One active poll. Lives until the age sweep removes it.
#[derive(Debug, Clone)]
pub struct PollEntry {
    pub question: String,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Registry of active polls, keyed by the id of the message carrying the
/// vote menu. Votes on ids not present here get the "no longer active"
/// treatment.
pub struct PollRegistry {
    polls: Mutex<HashMap<u64, PollEntry>>,
    selections: Mutex<SelectionState>,
}

#[derive(Default)]
struct SelectionState {
    seen: HashSet<(u64, u64)>,
    order: VecDeque<(u64, u64)>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self {
            polls: Mutex::new(HashMap::new()),
            selections: Mutex::new(SelectionState::default()),
        }
    }

    /// Record a freshly posted poll under its menu message id.
    pub fn register(&self, message_id: u64, entry: PollEntry) {
        let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        polls.insert(message_id, entry);
    }

    /// Look up a poll. Polls stay registered after a vote; every voter gets
    /// a lookup, not just the first.
    pub fn get(&self, message_id: u64) -> Option<PollEntry> {
        let polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        polls.get(&message_id).cloned()
    }

    /// Drop polls older than `max_age`. Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        let before = polls.len();
        polls.retain(|_, entry| entry.created_at > cutoff);
        before - polls.len()
    }

    pub fn active_count(&self) -> usize {
        let polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        polls.len()
    }

    /// Claim a (selection event, voter) pair. Returns false when the platform
    /// redelivers an interaction that is already in flight or recorded.
    pub fn mark_selection(&self, event_id: u64, voter_id: u64) -> bool {
        let mut state = self.selections.lock().unwrap_or_else(|e| e.into_inner());
        if !state.seen.insert((event_id, voter_id)) {
            return false;
        }
        state.order.push_back((event_id, voter_id));
        if state.order.len() > SELECTION_CAP {
            while state.order.len() > SELECTION_CAP / 2 {
                if let Some(old) = state.order.pop_front() {
                    state.seen.remove(&old);
                }
            }
        }
        true
    }

    /// Roll back a claimed selection after a failed acknowledgement, so the
    /// voter's retry isn't swallowed as a duplicate.
    pub fn release_selection(&self, event_id: u64, voter_id: u64) {
        let mut state = self.selections.lock().unwrap_or_else(|e| e.into_inner());
        state.seen.remove(&(event_id, voter_id));
        state.order.retain(|pair| *pair != (event_id, voter_id));
    }
}

impl Default for PollRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a select-menu value like `option_2` to the option text.
pub fn resolve_option<'a>(entry: &'a PollEntry, value: &str) -> Option<&'a str> {
    let index: usize = value.strip_prefix("option_")?.parse().ok()?;
    entry.options.get(index).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(age_minutes: i64) -> PollEntry {
        PollEntry {
            question: "pizza or tacos?".to_string(),
            options: vec!["pizza".to_string(), "tacos".to_string()],
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn registered_poll_stays_after_lookup() {
        let registry = PollRegistry::new();
        registry.register(10, entry(0));

        assert!(registry.get(10).is_some());
        assert!(registry.get(10).is_some());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn sweep_drops_only_expired_polls() {
        let registry = PollRegistry::new();
        registry.register(10, entry(90));
        registry.register(11, entry(5));

        let removed = registry.sweep(Duration::minutes(60));
        assert_eq!(removed, 1);
        assert!(registry.get(10).is_none());
        assert!(registry.get(11).is_some());
    }

    #[test]
    fn selection_dedup_drops_redelivered_event() {
        let registry = PollRegistry::new();
        assert!(registry.mark_selection(10, 100));
        assert!(!registry.mark_selection(10, 100));
        // Fresh events are always claimable, from this voter or another.
        assert!(registry.mark_selection(11, 100));
        assert!(registry.mark_selection(10, 101));
    }

    #[test]
    fn released_selection_can_be_claimed_again() {
        let registry = PollRegistry::new();
        assert!(registry.mark_selection(10, 100));
        registry.release_selection(10, 100);
        assert!(registry.mark_selection(10, 100));
    }

    #[test]
    fn resolve_option_maps_value_to_text() {
        let entry = entry(0);
        assert_eq!(resolve_option(&entry, "option_0"), Some("pizza"));
        assert_eq!(resolve_option(&entry, "option_1"), Some("tacos"));
        assert_eq!(resolve_option(&entry, "option_9"), None);
        assert_eq!(resolve_option(&entry, "garbage"), None);
    }

    #[test]
    fn option_markers_run_out_gracefully() {
        assert_eq!(option_marker(0), "1\u{fe0f}\u{20e3}");
        assert_eq!(option_marker(4), "5\u{fe0f}\u{20e3}");
        assert_eq!(option_marker(5), OPTION_EMOJI_FALLBACK);
    }
}
