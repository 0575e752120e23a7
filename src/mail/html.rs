//! HTML sanitizing and plain-text extraction for email bodies

use std::sync::LazyLock;

use regex::{Captures, Regex};

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?is)<script\b[^>]*>.*?</script\s*>"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?is)<style\b[^>]*>.*?</style\s*>"));
// Quoted attribute values may contain `>`
static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r#"<[A-Za-z](?:"[^"]*"|'[^']*'|[^>])*>"#));
// Quoted values are matched as a whole so handlers are only found between attributes
static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r#"(?i)"[^"]*"|'[^']*'|\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
});
static JAVASCRIPT_URL: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)javascript\s*:"));
static DATA_IMAGE_SRC: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r#"(?i)(\bsrc\s*=\s*)(?:"\s*data:image[^"]*"|'\s*data:image[^']*'|data:image[^\s>]*)"#)
});
static BLOCK_TAG: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)<\s*/?\s*(?:div|p|br|li|tr)\b[^>]*>"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"</?[A-Za-z!?][^>]*>"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[A-Za-z][A-Za-z0-9]*);"));
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\n(?:[ \t\x{a0}]*\n){2,}"));

pub(crate) fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Panic is ok thanks to the `load_regex` tests.
        Err(err) => panic!("invalid regex pattern `{pattern}`: {err}"),
    }
}

/// Remove active content from an HTML body.
///
/// Strips `<script>`/`<style>` blocks and inline `on*=` handlers, neutralizes
/// `javascript:` URLs and blanks `data:image` sources. Passes repeat until the
/// output is stable, so sanitizing sanitized HTML is a no-op. Every pass that
/// changes the input makes it shorter, which bounds the loop.
pub fn sanitize_html(html: &str) -> String {
    let mut current = html.to_string();
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn sanitize_pass(html: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(html, "");
    let without_styles = STYLE_BLOCK.replace_all(&without_scripts, "");
    OPEN_TAG
        .replace_all(&without_styles, |caps: &Captures| clean_tag(&caps[0]))
        .into_owned()
}

fn clean_tag(tag: &str) -> String {
    let tag = EVENT_HANDLER.replace_all(tag, |caps: &Captures| {
        let matched = &caps[0];
        if matched.starts_with(['"', '\'']) {
            matched.to_string()
        } else {
            String::new()
        }
    });
    let tag = JAVASCRIPT_URL.replace_all(&tag, "blocked:");
    DATA_IMAGE_SRC.replace_all(&tag, "${1}\"\"").into_owned()
}

/// Convert an HTML fragment to readable plain text.
///
/// Block-level tags become line breaks, every other tag is dropped, entities
/// are decoded and runs of blank lines collapse to a single blank line.
pub fn extract_plain_text(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = STYLE_BLOCK.replace_all(&text, "");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text).replace("\r\n", "\n");
    let text = BLANK_LINE_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Decode HTML entities.
///
/// The common named entities and all numeric references are decoded; unknown
/// named entities are left as written.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some(' '),
                _ => numeric_entity(name),
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn numeric_entity(name: &str) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render plain text as an HTML block, one `<br>` per line break.
pub fn text_to_html(text: &str) -> String {
    let body = text
        .trim()
        .lines()
        .map(escape_html)
        .collect::<Vec<_>>()
        .join("<br>");
    format!("<div>{}</div>", body)
}
