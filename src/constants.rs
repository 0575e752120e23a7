//! Pipeline-wide constants for tuning the heuristics
//!
//! Centralizes magic numbers to make them discoverable and configurable.

// === Token estimation ===

/// Characters per token assumed by the heuristic estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Context window assumed for model identifiers we don't know.
pub const DEFAULT_MODEL_LIMIT: usize = 4096;

/// A truncation cut is pulled back to the previous space only if that space
/// lies within this trailing fraction of the result.
pub const WORD_BOUNDARY_SLACK: f64 = 0.1;

// === Signature detection ===

/// Minimum non-whitespace characters that must precede a closing phrase
/// before it is trusted as a signature start.
pub const MIN_CONTENT_BEFORE_SIGNATURE: usize = 50;

/// Number of characters after a closing phrase inspected for signature-like
/// content (another phrase or an email address).
pub const SIGNATURE_LOOKAHEAD_CHARS: usize = 200;

/// Consecutive blank lines that mark a structural signature break.
pub const SIGNATURE_BLANK_LINE_RUN: usize = 2;

// === Summarization ===

/// Newest messages kept verbatim by thread summarization.
pub const RECENT_MESSAGE_WINDOW: usize = 3;

/// Above this budget/count ratio the overage is mild and plain truncation
/// is used instead of extractive reduction.
pub const MILD_OVERAGE_RATIO: f64 = 0.8;

/// Trailing share of the raw content (by characters) kept verbatim when a
/// flat text is reduced.
pub const RECENT_CONTENT_SHARE: f64 = 0.3;

/// Content shorter than this (in characters) is never compressed.
pub const SHORT_CONTENT_CHARS: usize = 100;

/// Sentences kept by the key-point fallback.
pub const KEY_POINT_SENTENCES: usize = 3;

/// Header written above the reduced older material.
pub const EARLIER_MARKER: &str = "[Earlier messages summarized]";

/// Header written above the verbatim recent material.
pub const RECENT_MARKER: &str = "[Recent messages]";

/// Separator line between messages in flattened thread text.
pub const MESSAGE_SEPARATOR: &str = "---";
