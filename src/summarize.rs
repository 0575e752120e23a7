//! Budget-aware reduction of email content before generation
//!
//! Content that fits the token budget passes through untouched. Mild overages
//! are truncated; larger ones keep the most recent material verbatim and
//! replace the older part with extracted key points. The final text is always
//! truncated to the budget after all framing has been added.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{
    EARLIER_MARKER, KEY_POINT_SENTENCES, MILD_OVERAGE_RATIO, RECENT_CONTENT_SHARE, RECENT_MARKER,
    RECENT_MESSAGE_WINDOW, SHORT_CONTENT_CHARS,
};
use crate::mail::html::compile_regex;
use crate::mail::thread::{Message, combine_messages_for_context, format_message, join_blocks};
use crate::tokens::{count_tokens, truncate_to_limit};

/// Lines containing one of these are kept as key points.
const URGENCY_MARKERS: &[&str] = &["IMPORTANT:", "URGENT:", "ACTION REQUIRED:", "DEADLINE:"];

static SENTENCE: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"[^.!?]+(?:[.!?]+|$)"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?m)^[ \t]*(?:[-*•]|\d+[.)])[ \t]+\S"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizationResult {
    pub content: String,
    pub was_summarized: bool,
    pub original_token_count: usize,
    pub final_token_count: usize,
}

impl SummarizationResult {
    fn unchanged(content: String, token_count: usize) -> Self {
        Self {
            content,
            was_summarized: false,
            original_token_count: token_count,
            final_token_count: token_count,
        }
    }

    fn reduced(content: String, original_token_count: usize, model: &str) -> Self {
        let final_token_count = count_tokens(&content, model);
        Self {
            content,
            was_summarized: true,
            original_token_count,
            final_token_count,
        }
    }

    pub fn tokens_saved(&self) -> usize {
        self.original_token_count
            .saturating_sub(self.final_token_count)
    }
}

/// Running totals over summarization calls, kept by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryStats {
    pub total_summarizations: u64,
    pub total_tokens_saved: u64,
}

impl SummaryStats {
    /// Add `result` to the totals. Results that were passed through unchanged
    /// don't count.
    pub fn record(&mut self, result: &SummarizationResult) {
        if !result.was_summarized {
            return;
        }
        self.total_summarizations += 1;
        self.total_tokens_saved += result.tokens_saved() as u64;
    }
}

/// Fit flat `content` into `max_tokens`.
pub fn summarize(content: &str, max_tokens: usize, model: &str) -> SummarizationResult {
    let original = count_tokens(content, model);
    if original <= max_tokens {
        return SummarizationResult::unchanged(content.to_string(), original);
    }

    let ratio = max_tokens as f64 / original as f64;
    let reduced = if ratio >= MILD_OVERAGE_RATIO {
        tracing::debug!(
            "Content {} tokens over budget {}, truncating",
            original,
            max_tokens
        );
        truncate_to_limit(content, max_tokens, model)
    } else {
        tracing::debug!(
            "Content {} tokens over budget {}, extracting key points",
            original,
            max_tokens
        );
        let framed = format!(
            "{}\n{}\n\n{}\n{}",
            EARLIER_MARKER,
            extract_key_points(content),
            RECENT_MARKER,
            trailing_share(content, RECENT_CONTENT_SHARE)
        );
        truncate_to_limit(&framed, max_tokens, model)
    };

    SummarizationResult::reduced(reduced, original, model)
}

/// Fit a parsed thread (newest message first) into `max_tokens`.
///
/// Under budget, the result is exactly [`combine_messages_for_context`].
/// Otherwise the newest [`RECENT_MESSAGE_WINDOW`] messages are kept in full,
/// oldest of them first, and anything older is reduced to key points.
pub fn summarize_thread(messages: &[Message], max_tokens: usize, model: &str) -> SummarizationResult {
    let combined = combine_messages_for_context(messages);
    let original = count_tokens(&combined, model);
    if original <= max_tokens {
        return SummarizationResult::unchanged(combined, original);
    }

    let window = RECENT_MESSAGE_WINDOW.min(messages.len());
    let (recent, older) = messages.split_at(window);
    let recent_block = join_blocks(recent.iter().rev().map(format_message));

    tracing::debug!(
        "Thread of {} messages is {} tokens over budget {}, keeping {} verbatim",
        messages.len(),
        original,
        max_tokens,
        window
    );

    let assembled = if older.is_empty() {
        recent_block
    } else {
        let header = format!("{}\n", EARLIER_MARKER);
        let recent_section = format!("\n\n{}\n{}", RECENT_MARKER, recent_block);
        let used = count_tokens(&format!("{}{}", header, recent_section), model);
        let older_summary = truncate_to_limit(
            &summarize_older_messages(older),
            max_tokens.saturating_sub(used),
            model,
        );
        format!("{}{}{}", header, older_summary, recent_section)
    };

    let content = truncate_to_limit(&assembled, max_tokens, model);
    SummarizationResult::reduced(content, original, model)
}

/// Key points of older messages (given newest first), oldest first.
fn summarize_older_messages(messages: &[Message]) -> String {
    let senders: HashSet<&str> = messages.iter().filter_map(|m| m.from.as_deref()).collect();
    let participants = if senders.is_empty() {
        messages.len()
    } else {
        senders.len()
    };

    let points = messages
        .iter()
        .rev()
        .map(|m| extract_key_points(&m.content))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Previous conversation between {} participants:\n{}",
        participants, points
    )
}

/// Reduce `content` to its key points.
///
/// Short content is returned as is. Lines flagged IMPORTANT/URGENT/ACTION
/// REQUIRED/DEADLINE win; without any, the first three sentences are used.
pub fn extract_key_points(content: &str) -> String {
    if content.chars().count() < SHORT_CONTENT_CHARS {
        return content.to_string();
    }

    let flagged: Vec<&str> = content
        .lines()
        .filter(|line| {
            let upper = line.to_uppercase();
            URGENCY_MARKERS.iter().any(|marker| upper.contains(marker))
        })
        .map(str::trim)
        .collect();
    if !flagged.is_empty() {
        return flagged.join("\n");
    }

    SENTENCE
        .find_iter(content)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .take(KEY_POINT_SENTENCES)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Advisory guess of how far `content` could be compressed, in `[0.3, 1.0]`.
pub fn estimate_compression_ratio(content: &str) -> f64 {
    if content.chars().count() < SHORT_CONTENT_CHARS {
        return 1.0;
    }

    let mut ratio: f64 = 0.7;
    if BULLET.is_match(content) {
        ratio -= 0.1;
    }
    if content.trim_start().starts_with('>') {
        ratio -= 0.1;
    }
    if repetition_score(content) > 0.3 {
        ratio -= 0.1;
    }
    ratio.clamp(0.3, 1.0)
}

/// Share of words that are repeats beyond a word's second occurrence.
fn repetition_score(content: &str) -> f64 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for word in content.split_whitespace() {
        *counts.entry(word.to_lowercase()).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let excess: usize = counts.values().map(|&c| c.saturating_sub(2)).sum();
    excess as f64 / total as f64
}

/// Last `share` of `content` by character count.
fn trailing_share(content: &str, share: f64) -> &str {
    let chars = content.chars().count();
    let keep = (chars as f64 * share).round() as usize;
    let skip = chars.saturating_sub(keep);
    content
        .char_indices()
        .nth(skip)
        .map(|(i, _)| &content[i..])
        .unwrap_or_default()
}
