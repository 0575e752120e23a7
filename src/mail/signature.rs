//! Signature detection for HTML and plain-text bodies
//!
//! No single signal finds signatures reliably across clients, so detection is
//! layered and the first layer that answers wins:
//! 1. Elements carrying a known signature class
//! 2. Closing phrases ("Best regards", "Sent from my ...") that follow real
//!    content and are themselves followed by signature-like text
//! 3. Structure: an `<hr>`, or a signature-like line after a run of blank lines
//! 4. Closing phrases that only fail the minimum-content check
//!
//! Offsets are byte offsets into the input and always fall on a char boundary.

use std::collections::HashSet;
use std::sync::LazyLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;

use super::client::quote_start;
use super::html::{compile_regex, extract_plain_text, text_to_html};
use crate::constants::{
    MIN_CONTENT_BEFORE_SIGNATURE, SIGNATURE_BLANK_LINE_RUN, SIGNATURE_LOOKAHEAD_CHARS,
};

/// Class (or id) tokens that mark a signature element.
const SIGNATURE_CLASSES: &[&str] = &["Signature", "signature", "gmail_signature", "moz-signature"];

/// Phrases that typically open a sign-off, matched case-insensitively.
const CLOSING_PHRASES: &[&str] = &[
    "best regards",
    "kind regards",
    "warm regards",
    "regards,",
    "sincerely",
    "best wishes",
    "thanks,",
    "thank you,",
    "cheers,",
    "sent from my",
];

static PHRASES: LazyLock<AhoCorasick> = LazyLock::new(|| {
    match AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(CLOSING_PHRASES)
    {
        Ok(ac) => ac,
        // Panic is ok thanks to the `load_matchers` test.
        Err(err) => panic!("invalid closing phrase set: {err}"),
    }
});
static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"<[A-Za-z][^>]*>"));
static MARKER_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r#"(?i)\b(?:class|id)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
});
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}"));
static HR_TAG: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)<hr\b[^>]*>"));
static BODY_OPEN: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)<body\b[^>]*>"));

/// Find where the trailing signature block starts, if any.
pub fn detect_signature(content: &str) -> Option<usize> {
    if content.trim().is_empty() {
        return None;
    }

    let found = class_marker(content)
        .or_else(|| closing_phrase(content, MIN_CONTENT_BEFORE_SIGNATURE))
        .or_else(|| structural_break(content))
        .or_else(|| closing_phrase(content, 1));

    if let Some(offset) = found {
        tracing::debug!("Signature detected at offset {}", offset);
    }
    found
}

/// Start of the first element whose class or id is a signature marker.
fn class_marker(content: &str) -> Option<usize> {
    OPEN_TAG
        .find_iter(content)
        .find(|tag| !tag_markers(tag.as_str()).is_empty())
        .map(|tag| tag.start())
}

/// Signature marker tokens in the class and id attributes of one tag.
fn tag_markers(tag: &str) -> Vec<&str> {
    MARKER_ATTR
        .captures_iter(tag)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .flat_map(|value| value.as_str().split_whitespace())
        .filter(|token| SIGNATURE_CLASSES.contains(token))
        .collect()
}

/// Earliest closing phrase with at least `min_before` non-whitespace
/// characters of text before it and signature-like text after it.
fn closing_phrase(content: &str, min_before: usize) -> Option<usize> {
    PHRASES
        .find_iter(content)
        .find(|m| {
            content_before(content, m.start()) >= min_before
                && tail_looks_like_signature(content, m.end())
        })
        .map(|m| m.start())
}

fn content_before(content: &str, offset: usize) -> usize {
    extract_plain_text(&content[..offset])
        .chars()
        .filter(|c| !c.is_whitespace())
        .count()
}

fn tail_looks_like_signature(content: &str, from: usize) -> bool {
    let rest = &content[from..];
    let end = rest
        .char_indices()
        .nth(SIGNATURE_LOOKAHEAD_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let tail = &rest[..end];
    PHRASES.is_match(tail) || EMAIL.is_match(tail)
}

/// An `<hr>`, or a signature-like line following two or more blank lines.
fn structural_break(content: &str) -> Option<usize> {
    if let Some(hr) = HR_TAG.find(content) {
        return Some(hr.start());
    }

    let mut offset = 0;
    let mut blank_run = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
        } else {
            if blank_run >= SIGNATURE_BLANK_LINE_RUN && is_likely_signature(trimmed) {
                return Some(offset);
            }
            blank_run = 0;
        }
        offset += line.len();
    }
    None
}

/// Whether `text` contains a closing phrase, an email address or a phone number.
pub fn is_likely_signature(text: &str) -> bool {
    PHRASES.is_match(text) || EMAIL.is_match(text) || PHONE.is_match(text)
}

/// Score in `[0, 1]` of how strongly `content` carries a signature.
///
/// Each distinct marker class adds 0.4, each distinct closing phrase 0.2, an
/// email address 0.2, a phone number 0.1 and an `<hr>` 0.1. Content without
/// any indicator scores exactly 0.
pub fn signature_confidence(content: &str) -> f64 {
    if content.is_empty() {
        return 0.0;
    }

    let classes: HashSet<String> = OPEN_TAG
        .find_iter(content)
        .flat_map(|tag| tag_markers(tag.as_str()))
        .map(str::to_ascii_lowercase)
        .collect();
    let phrases: HashSet<usize> = PHRASES
        .find_iter(content)
        .map(|m| m.pattern().as_usize())
        .collect();

    let mut score = 0.4 * classes.len() as f64 + 0.2 * phrases.len() as f64;
    if EMAIL.is_match(content) {
        score += 0.2;
    }
    if PHONE.is_match(content) {
        score += 0.1;
    }
    if HR_TAG.is_match(content) {
        score += 0.1;
    }

    score.min(1.0)
}

/// The signature block, or an empty string when none was detected.
pub fn extract_signature(content: &str) -> String {
    detect_signature(content)
        .map(|offset| content[offset..].to_string())
        .unwrap_or_default()
}

/// Insert `text` as an HTML block directly above the signature of `html`.
///
/// Only the newest message, before any quoted history, is searched for the
/// signature. Without one the block goes to the top of the body (after the
/// `<body>` tag when there is one).
pub fn insert_above_signature(html: &str, text: &str) -> String {
    insert_above_signature_before(html, text, quote_start(html))
}

/// [`insert_above_signature`] with the start of quoted history already known.
pub fn insert_above_signature_before(
    html: &str,
    text: &str,
    quote_start: Option<usize>,
) -> String {
    let block = text_to_html(text);
    let newest_end = quote_start
        .filter(|&end| html.is_char_boundary(end))
        .unwrap_or(html.len());
    let offset = detect_signature(&html[..newest_end])
        .or_else(|| BODY_OPEN.find(&html[..newest_end]).map(|m| m.end()))
        .unwrap_or(0);

    let mut out = String::with_capacity(html.len() + block.len());
    out.push_str(&html[..offset]);
    out.push_str(&block);
    out.push_str(&html[offset..]);
    out
}
