//! Parses the model's free-text reply into display text plus side-effect
//! directives.
//!
//! The model is instructed to emit bold-markdown command markers on their own
//! lines ahead of the reply body. The parser is total: any input, however
//! malformed, yields a usable `ParsedReply`.

use regex::Regex;
use std::sync::LazyLock;

/// Substituted when the extracted reply body is empty.
pub const FILLER_TEXT: &str = "yo whats good 🌟";

static OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^OPTION_\d+:\s*(.+)").expect("hardcoded regex"));

static GENERIC_ATTRIBUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+:\s*").expect("hardcoded regex"));

/// A poll directive recognized in the model output. Only populated when at
/// least two option lines followed the vote marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    pub question: String,
    pub options: Vec<String>,
}

/// Structured form of one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Display text. Never empty; falls back to [`FILLER_TEXT`].
    pub text: String,
    pub charisma_delta: Option<i64>,
    pub vibe: Option<String>,
    pub reaction: Option<String>,
    pub poll: Option<PollSpec>,
}

/// Free-text notes the model tends to leave inside its analysis section.
/// Lines containing any of these are part of the analysis, not the reply.
const ANALYSIS_NOTES: &[&str] = &[
    "Message Quality:",
    "Reason:",
    "Base Charisma Change:",
    "Applied Formula:",
    "Final Charisma Change:",
    "Current User State:",
    "Chosen Action:",
];

fn is_command_line(line: &str) -> bool {
    line.starts_with("**CHARISMA:**")
        || line.starts_with("**VIBE:**")
        || line.starts_with("**REACT:**")
        || line.starts_with("**CREATE_VOTE:**")
}

fn is_option_line(line: &str) -> bool {
    OPTION_RE.is_match(line)
}

/// First whitespace-delimited token, truncated at the first non-word
/// character. `None` when nothing word-like is left.
fn word_token(rest: &str) -> Option<String> {
    let token: String = rest
        .trim()
        .split_whitespace()
        .next()?
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if token.is_empty() { None } else { Some(token) }
}

/// Parse a raw model reply. Pure and total: worst case the raw text comes
/// back verbatim as the display text.
///
/// Marker semantics: repeated markers overwrite (last one wins); a vote
/// marker with fewer than two options is discarded entirely but its header
/// still doesn't reach the reply body; a charisma value that isn't a clean
/// signed integer is ignored.
pub fn parse(raw: &str, bot_name: &str) -> ParsedReply {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();

    let mut result = ParsedReply {
        text: String::new(),
        charisma_delta: None,
        vibe: None,
        reaction: None,
        poll: None,
    };

    let mut body_start = 0usize;
    let mut in_analysis = false;

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("**ANALYSIS:**") {
            in_analysis = true;
            body_start = body_start.max(i + 1);
            continue;
        }

        if let Some(rest) = line.strip_prefix("**CHARISMA:**") {
            if let Some(token) = rest.trim().split_whitespace().next() {
                if let Ok(delta) = token.parse::<i64>() {
                    result.charisma_delta = Some(delta);
                }
            }
            body_start = body_start.max(i + 1);
            continue;
        }

        if let Some(rest) = line.strip_prefix("**VIBE:**") {
            if let Some(token) = word_token(rest) {
                result.vibe = Some(token);
            }
            body_start = body_start.max(i + 1);
            continue;
        }

        if let Some(rest) = line.strip_prefix("**REACT:**") {
            if let Some(token) = word_token(rest) {
                result.reaction = Some(token);
            }
            body_start = body_start.max(i + 1);
            continue;
        }

        if let Some(rest) = line.strip_prefix("**CREATE_VOTE:**") {
            let question = rest.trim();
            if !question.is_empty() {
                let mut options = Vec::new();
                for later in &lines[i + 1..] {
                    if let Some(captures) = OPTION_RE.captures(later) {
                        options.push(captures[1].trim().to_string());
                    } else if !later.is_empty() && !later.starts_with("OPTION_") {
                        break;
                    }
                }
                if options.len() >= 2 {
                    result.poll = Some(PollSpec {
                        question: question.to_string(),
                        options,
                    });
                }
            }
            body_start = body_start.max(i + 1);
            continue;
        }

        // Inside the analysis section, bullet/bold/blank lines and the
        // model's scoring notes are all analysis, not reply text.
        if in_analysis
            && (line.is_empty()
                || line.starts_with('-')
                || line.starts_with("**")
                || ANALYSIS_NOTES.iter().any(|note| line.contains(note)))
        {
            body_start = body_start.max(i + 1);
            continue;
        }

        // First plain content line: everything from body_start down is reply.
        if !line.is_empty()
            && !is_command_line(line)
            && !is_option_line(line)
            && !line.starts_with('-')
            && !line.starts_with("**")
        {
            break;
        }
    }

    let body = lines[body_start..]
        .iter()
        .filter(|line| !line.is_empty() && !is_command_line(line) && !is_option_line(line))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    result.text = clean_attribution(body.trim(), bot_name);
    if result.text.is_empty() {
        result.text = FILLER_TEXT.to_string();
    }

    result
}

/// Strip a leading `name:` self-attribution. The model must never open its
/// reply with its own name; first the configured bot name is removed
/// case-insensitively, then any remaining generic `word:` prefix.
fn clean_attribution(text: &str, bot_name: &str) -> String {
    let mut cleaned = text.trim();

    // get() instead of slicing: the name length may not land on a char
    // boundary when the reply opens with multibyte text.
    if let (Some(head), Some(tail)) = (cleaned.get(..bot_name.len()), cleaned.get(bot_name.len()..))
    {
        if head.eq_ignore_ascii_case(bot_name) && tail.starts_with(':') {
            cleaned = cleaned[bot_name.len() + 1..].trim_start();
        }
    }

    GENERIC_ATTRIBUTION_RE.replace(cleaned, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const BOT: &str = "kiki";

    #[test]
    fn plain_text_passes_through() {
        let reply = parse("hello there!", BOT);
        assert_eq!(reply.text, "hello there!");
        assert_eq!(reply.charisma_delta, None);
        assert_eq!(reply.vibe, None);
        assert_eq!(reply.reaction, None);
        assert!(reply.poll.is_none());
    }

    #[test]
    fn charisma_and_vibe_markers() {
        let reply = parse("**CHARISMA:** +5\n**VIBE:** flirty\nhii~", BOT);
        assert_eq!(reply.text, "hii~");
        assert_eq!(reply.charisma_delta, Some(5));
        assert_eq!(reply.vibe.as_deref(), Some("flirty"));
    }

    #[test]
    fn negative_charisma() {
        let reply = parse("**CHARISMA:** -3\nbooo", BOT);
        assert_eq!(reply.charisma_delta, Some(-3));
        assert_eq!(reply.text, "booo");
    }

    #[test]
    fn malformed_charisma_is_ignored() {
        let reply = parse("**CHARISMA:** +5x\nhey", BOT);
        assert_eq!(reply.charisma_delta, None);
        assert_eq!(reply.text, "hey");
    }

    #[test]
    fn last_marker_wins() {
        let reply = parse("**CHARISMA:** +2\n**CHARISMA:** -4\nok", BOT);
        assert_eq!(reply.charisma_delta, Some(-4));
    }

    #[test]
    fn vote_with_two_options() {
        let raw = indoc! {"
            **CREATE_VOTE:** Pizza or tacos?
            OPTION_1: Pizza
            OPTION_2: Tacos
        "};
        let reply = parse(raw, BOT);
        let poll = reply.poll.expect("poll should be recognized");
        assert_eq!(poll.question, "Pizza or tacos?");
        assert_eq!(poll.options, vec!["Pizza", "Tacos"]);
        // No reply body left over, filler takes its place.
        assert_eq!(reply.text, FILLER_TEXT);
    }

    #[test]
    fn vote_with_one_option_is_discarded() {
        let raw = indoc! {"
            **CREATE_VOTE:** Pizza?
            OPTION_1: Pizza
            yeah so anyway
        "};
        let reply = parse(raw, BOT);
        assert!(reply.poll.is_none());
        // The header and collected option never reach the body.
        assert_eq!(reply.text, "yeah so anyway");
    }

    #[test]
    fn option_collection_stops_at_plain_line() {
        let raw = indoc! {"
            **CREATE_VOTE:** Best color?
            OPTION_1: Red
            and that's my question
            OPTION_2: Blue
        "};
        let reply = parse(raw, BOT);
        assert!(reply.poll.is_none());
    }

    #[test]
    fn analysis_section_is_skipped() {
        let raw = indoc! {"
            **ANALYSIS:**
            - Message Quality: great
            - Chosen Action: respond warmly
            **CHARISMA:** +1
            sounds fun!!
        "};
        let reply = parse(raw, BOT);
        assert_eq!(reply.charisma_delta, Some(1));
        assert_eq!(reply.text, "sounds fun!!");
    }

    #[test]
    fn reaction_token() {
        let reply = parse("**REACT:** heart\nawww", BOT);
        assert_eq!(reply.reaction.as_deref(), Some("heart"));
        assert_eq!(reply.text, "awww");
    }

    #[test]
    fn empty_input_gets_filler() {
        assert_eq!(parse("", BOT).text, FILLER_TEXT);
        assert_eq!(parse("   \n  \n", BOT).text, FILLER_TEXT);
    }

    #[test]
    fn self_attribution_is_stripped() {
        assert_eq!(parse("kiki: hii!", BOT).text, "hii!");
        assert_eq!(parse("KIKI: hii!", BOT).text, "hii!");
        // Generic username prefixes go too.
        assert_eq!(parse("some_user: hii!", BOT).text, "hii!");
    }

    #[test]
    fn multiline_body_is_preserved() {
        let reply = parse("**VIBE:** chill\nline one\nline two", BOT);
        assert_eq!(reply.text, "line one\nline two");
    }

    #[test]
    fn commands_after_body_are_not_parsed() {
        // The scan stops at the first plain content line; later marker-shaped
        // lines are stripped from the body but never change fields.
        let reply = parse("hello!\n**CHARISMA:** +9", BOT);
        assert_eq!(reply.charisma_delta, None);
        assert_eq!(reply.text, "hello!");
    }
}
