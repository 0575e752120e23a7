//! Authoring-client detection from HTML structure
//!
//! Outlook and Gmail quote earlier messages in recognizable ways. The
//! fingerprints here pick the client and the matching delimiter used to split
//! a reply body into its messages.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::html::compile_regex;

/// Header-separator colors Outlook draws above quoted replies.
pub const DEFAULT_OUTLOOK_SEPARATOR_COLORS: &[&str] = &["B5C4DF", "E1E1E1"];

static OUTLOOK_SIGNATURE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r#"\b(?i:id|class)\s*=\s*["']?Signature\b"#));
static GMAIL_QUOTE_DIV: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r#"(?i)<div\b[^>]*\bclass\s*=\s*["'][^"']*\bgmail_quote\b[^"']*["'][^>]*>"#)
});
static HORIZONTAL_RULE: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)<hr\b[^>]*>"));
static DEFAULT_FINGERPRINTS: LazyLock<ClientFingerprints> =
    LazyLock::new(ClientFingerprints::default);

/// Email client that authored an HTML body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientKind {
    Outlook,
    Gmail,
    #[default]
    Unknown,
}

impl ClientKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outlook => "outlook",
            Self::Gmail => "gmail",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural fingerprints used to classify and split bodies.
///
/// The Outlook separator color varies across versions and locales, so the
/// accepted colors are configurable.
#[derive(Debug, Clone)]
pub struct ClientFingerprints {
    outlook_border: Regex,
    outlook_separator: Regex,
}

impl ClientFingerprints {
    /// Build fingerprints accepting the given separator colors (hex, with or
    /// without `#`). Entries that aren't hex colors are ignored; if none are
    /// left the defaults are used.
    pub fn new<S: AsRef<str>>(outlook_separator_colors: &[S]) -> Self {
        let mut colors: Vec<String> = outlook_separator_colors
            .iter()
            .map(|c| c.as_ref().trim().trim_start_matches('#').to_string())
            .filter(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_hexdigit()))
            .collect();

        if colors.is_empty() {
            if !outlook_separator_colors.is_empty() {
                tracing::warn!("No usable Outlook separator colors configured, using defaults");
            }
            colors = DEFAULT_OUTLOOK_SEPARATOR_COLORS
                .iter()
                .map(|c| c.to_string())
                .collect();
        }

        let alternatives = colors.join("|");
        let border = format!(r"border-top:\s*solid\s+#(?:{})\b", alternatives);

        Self {
            outlook_border: compile_regex(&format!("(?i){}", border)),
            outlook_separator: compile_regex(&format!(r"(?i)<div\b[^>]*{}[^>]*>", border)),
        }
    }

    /// Classify `html`. Outlook fingerprints are checked before Gmail's.
    pub fn detect(&self, html: &str) -> ClientKind {
        if self.outlook_border.is_match(html) || OUTLOOK_SIGNATURE_MARKER.is_match(html) {
            ClientKind::Outlook
        } else if html.contains("gmail_quote") || html.contains("gmail_signature") {
            ClientKind::Gmail
        } else {
            ClientKind::Unknown
        }
    }

    /// Split `html` into message fragments, newest first, using the delimiter
    /// of `kind`. Outlook bodies without a header separator and unknown bodies
    /// split on `<hr>`; without one they are a single fragment.
    pub fn split<'a>(&self, kind: ClientKind, html: &'a str) -> Vec<&'a str> {
        match kind {
            ClientKind::Outlook if self.outlook_separator.is_match(html) => {
                self.outlook_separator.split(html).collect()
            }
            ClientKind::Gmail => GMAIL_QUOTE_DIV.split(html).collect(),
            ClientKind::Outlook | ClientKind::Unknown => HORIZONTAL_RULE.split(html).collect(),
        }
    }

    /// Byte offset of the first quoted-reply delimiter of `kind` in `html`,
    /// i.e. where the newest message ends.
    pub fn quote_start(&self, kind: ClientKind, html: &str) -> Option<usize> {
        let delimiter = match kind {
            ClientKind::Outlook => self
                .outlook_separator
                .find(html)
                .or_else(|| HORIZONTAL_RULE.find(html)),
            ClientKind::Gmail => GMAIL_QUOTE_DIV.find(html),
            ClientKind::Unknown => HORIZONTAL_RULE.find(html),
        };
        delimiter.map(|m| m.start())
    }
}

impl Default for ClientFingerprints {
    fn default() -> Self {
        Self::new(DEFAULT_OUTLOOK_SEPARATOR_COLORS)
    }
}

/// Classify `html` with the default fingerprints.
pub fn detect_email_client(html: &str) -> ClientKind {
    DEFAULT_FINGERPRINTS.detect(html)
}

/// Where quoted history starts in `html`, classified with the default fingerprints.
pub fn quote_start(html: &str) -> Option<usize> {
    DEFAULT_FINGERPRINTS.quote_start(DEFAULT_FINGERPRINTS.detect(html), html)
}
