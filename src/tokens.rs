//! Token counting, model limits and pricing
//!
//! Counts are exact when a BPE encoding is known for the model and fall back
//! to a `chars / 4` heuristic otherwise. Nothing in here returns an error:
//! an unknown model or an unavailable tokenizer only degrades precision.

use std::sync::LazyLock;

use tiktoken_rs::CoreBPE;

use crate::constants::{CHARS_PER_TOKEN, DEFAULT_MODEL_LIMIT, WORD_BOUNDARY_SLACK};

static CL100K: LazyLock<Option<CoreBPE>> =
    LazyLock::new(|| load_encoding("cl100k_base", tiktoken_rs::cl100k_base()));
static O200K: LazyLock<Option<CoreBPE>> =
    LazyLock::new(|| load_encoding("o200k_base", tiktoken_rs::o200k_base()));

fn load_encoding(name: &str, result: anyhow::Result<CoreBPE>) -> Option<CoreBPE> {
    match result {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!("Tokenizer {} unavailable, using heuristic: {}", name, e);
            None
        }
    }
}

/// Models with a known context window, encoding and price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownModel {
    Gpt4,
    Gpt4Turbo,
    Gpt4o,
    Gpt35Turbo,
}

impl KnownModel {
    /// Resolve a model identifier. Provider prefixes such as `openai/` are ignored.
    pub fn from_id(model: &str) -> Option<Self> {
        let id = model.trim();
        let id = id.rsplit_once('/').map(|(_, name)| name).unwrap_or(id);
        match id.to_ascii_lowercase().as_str() {
            "gpt-4" => Some(Self::Gpt4),
            "gpt-4-turbo" => Some(Self::Gpt4Turbo),
            "gpt-4o" => Some(Self::Gpt4o),
            "gpt-3.5-turbo" => Some(Self::Gpt35Turbo),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::Gpt4 => "gpt-4",
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Gpt4o => "gpt-4o",
            Self::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }

    /// Context window in tokens
    pub fn context_window(self) -> usize {
        match self {
            Self::Gpt4 => 8_192,
            Self::Gpt4Turbo => 128_000,
            Self::Gpt4o => 128_000,
            Self::Gpt35Turbo => 16_385,
        }
    }

    /// USD per 1K tokens as (input, output)
    pub fn price_per_1k(self) -> (f64, f64) {
        match self {
            Self::Gpt4 => (0.03, 0.06),
            Self::Gpt4Turbo => (0.01, 0.03),
            Self::Gpt4o => (0.005, 0.015),
            Self::Gpt35Turbo => (0.0005, 0.0015),
        }
    }

    fn encoding(self) -> Option<&'static CoreBPE> {
        match self {
            Self::Gpt4o => O200K.as_ref(),
            Self::Gpt4 | Self::Gpt4Turbo | Self::Gpt35Turbo => CL100K.as_ref(),
        }
    }
}

/// Result of [`check_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitCheck {
    pub within_limit: bool,
    pub token_count: usize,
    /// `limit - token_count`; negative when over budget
    pub tokens_remaining: i64,
}

/// Count tokens in `text` for `model`.
///
/// Blank text is always 0. Models without a known encoding use
/// [`estimate_tokens`].
pub fn count_tokens(text: &str, model: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }

    match KnownModel::from_id(model).and_then(KnownModel::encoding) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate_tokens(text),
    }
}

/// Model-independent estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Context window for `model`, or a conservative default for unknown models.
pub fn model_limit(model: &str) -> usize {
    KnownModel::from_id(model)
        .map(KnownModel::context_window)
        .unwrap_or(DEFAULT_MODEL_LIMIT)
}

pub fn check_limit(text: &str, limit: usize, model: &str) -> LimitCheck {
    let token_count = count_tokens(text, model);
    LimitCheck {
        within_limit: token_count <= limit,
        token_count,
        tokens_remaining: limit as i64 - token_count as i64,
    }
}

/// Longest prefix of `text` found by binary search over character length
/// whose token count is at most `limit`.
///
/// The search runs over characters because tokenization can't be inverted
/// cheaply, so the cut is not an exact token boundary. When the last space of
/// the prefix sits within its final 10%, the prefix is pulled back to that
/// space to avoid splitting a word.
pub fn truncate_to_limit(text: &str, limit: usize, model: &str) -> String {
    if count_tokens(text, model) <= limit {
        return text.to_string();
    }

    // boundaries[k] is the byte offset of the prefix holding k chars
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    // Invariant: prefix of `lo` chars fits, prefix of `hi` chars does not
    let mut lo = 0;
    let mut hi = boundaries.len() - 1;
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if count_tokens(&text[..boundaries[mid]], model) <= limit {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let cut = &text[..boundaries[lo]];
    if let Some(space) = cut.rfind(' ')
        && space > 0
        && (space as f64) >= cut.len() as f64 * (1.0 - WORD_BOUNDARY_SLACK)
        && count_tokens(&cut[..space], model) <= limit
    {
        return cut[..space].to_string();
    }

    cut.to_string()
}

/// Price in USD for a request; unknown models cost 0.
pub fn calculate_cost(input_tokens: usize, output_tokens: usize, model: &str) -> f64 {
    let Some(known) = KnownModel::from_id(model) else {
        return 0.0;
    };
    let (input_price, output_price) = known.price_per_1k();
    (input_tokens as f64 / 1000.0) * input_price
        + (output_tokens as f64 / 1000.0) * output_price
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_SENTENCE: &str = "This is a long sentence with many words that keeps going well past \
         any small budget so that truncation has real work to do here.";

    #[test]
    fn test_blank_text_is_zero() {
        assert_eq!(count_tokens("", "gpt-4"), 0);
        assert_eq!(count_tokens("   \n\t", "gpt-4"), 0);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(count_tokens("", "some-unknown-model"), 0);
    }

    #[test]
    fn test_heuristic_rounds_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(5000)), 1250);
    }

    #[test]
    fn test_unknown_model_uses_heuristic() {
        let text = "Hello there, how are you doing today?";
        assert_eq!(count_tokens(text, "mystery-model"), estimate_tokens(text));
    }

    #[test]
    fn test_known_model_counts_tokens() {
        let count = count_tokens("Hello world", "gpt-4");
        assert!(count >= 1 && count <= 4, "unexpected count {}", count);
    }

    #[test]
    fn test_model_ids() {
        assert_eq!(KnownModel::from_id("gpt-4o"), Some(KnownModel::Gpt4o));
        assert_eq!(KnownModel::from_id("openai/gpt-4"), Some(KnownModel::Gpt4));
        assert_eq!(KnownModel::from_id("GPT-3.5-TURBO"), Some(KnownModel::Gpt35Turbo));
        assert_eq!(KnownModel::from_id("claude-3"), None);
        assert_eq!(KnownModel::Gpt4Turbo.id(), "gpt-4-turbo");
    }

    #[test]
    fn test_model_limit() {
        assert_eq!(model_limit("gpt-4"), 8_192);
        assert_eq!(model_limit("gpt-4o"), 128_000);
        assert_eq!(model_limit("not-a-model"), DEFAULT_MODEL_LIMIT);
    }

    #[test]
    fn test_check_limit_remaining_can_be_negative() {
        let text = "a".repeat(40);
        let check = check_limit(&text, 5, "unknown");
        assert!(!check.within_limit);
        assert_eq!(check.token_count, 10);
        assert_eq!(check.tokens_remaining, -5);

        let check = check_limit(&text, 10, "unknown");
        assert!(check.within_limit);
        assert_eq!(check.tokens_remaining, 0);
    }

    #[test]
    fn test_count_grows_with_appended_text() {
        let base = "The quarterly report is attached.";
        let extended = format!("{} Please review it before Friday.", base);
        for model in ["gpt-4", "gpt-4o", "unknown"] {
            assert!(count_tokens(base, model) <= count_tokens(&extended, model));
        }
    }

    #[test]
    fn test_truncate_unchanged_when_under_limit() {
        assert_eq!(truncate_to_limit("short text", 100, "gpt-4"), "short text");
    }

    #[test]
    fn test_truncate_respects_budget() {
        let truncated = truncate_to_limit(LONG_SENTENCE, 10, "gpt-4");
        assert!(count_tokens(&truncated, "gpt-4") <= 10);
        assert!(truncated.len() < LONG_SENTENCE.len());
        assert!(LONG_SENTENCE.starts_with(&truncated));
    }

    #[test]
    fn test_truncate_respects_budget_across_models_and_limits() {
        for model in ["gpt-4", "gpt-4o", "gpt-3.5-turbo", "unknown"] {
            for limit in [0, 1, 3, 7, 20] {
                let truncated = truncate_to_limit(LONG_SENTENCE, limit, model);
                assert!(
                    count_tokens(&truncated, model) <= limit,
                    "model {} limit {} gave {:?}",
                    model,
                    limit,
                    truncated
                );
            }
        }
    }

    #[test]
    fn test_truncate_avoids_mid_word_cut() {
        // Budget of 5 heuristic tokens is 20 chars; the space at 18 is in the last 10%
        let text = "abcdefghijklmnopqr stuvwxyz and some more words";
        assert_eq!(truncate_to_limit(text, 5, "unknown"), "abcdefghijklmnopqr");
    }

    #[test]
    fn test_truncate_keeps_cut_when_space_is_far_back() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu";
        assert_eq!(truncate_to_limit(text, 5, "unknown"), "alpha beta gamma del");
    }

    #[test]
    fn test_truncate_multibyte_text() {
        let text = "héllo wörld ünïcode ".repeat(10);
        let truncated = truncate_to_limit(&text, 4, "unknown");
        assert!(estimate_tokens(&truncated) <= 4);
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn test_calculate_cost() {
        let cost = calculate_cost(1000, 1000, "gpt-4");
        assert!((cost - 0.09).abs() < 1e-9);
        let cost = calculate_cost(2000, 500, "gpt-3.5-turbo");
        assert!((cost - 0.00175).abs() < 1e-9);
        assert_eq!(calculate_cost(1000, 1000, "unknown"), 0.0);
    }
}
