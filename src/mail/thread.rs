use std::sync::LazyLock;

use regex::Regex;

use super::client::{ClientFingerprints, ClientKind};
use super::html::{compile_regex, extract_plain_text, sanitize_html};
use crate::constants::MESSAGE_SEPARATOR;

static FROM_LINE: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?im)^[ \t]*From:[ \t]*(.+)$"));
static DATE_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?im)^[ \t]*(?:Date|Sent):[ \t]*(.+)$"));
// "On Mon, Jan 1, 2024 at 10:00 AM Jane Roe <jane@example.com> wrote:"
static ATTRIBUTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"(?m)^[ \t]*On (.+?\d{1,2}:\d{2}(?:\s?[AaPp][Mm])?)[,\s]+(.+?)\s+wrote:\s*$")
});
static DEFAULT_PARSER: LazyLock<ThreadParser> = LazyLock::new(ThreadParser::default);

/// One message of a quoted email thread.
///
/// `from` and `date` are display strings copied out of the quoted headers.
/// They are `None` when no header was found, never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub from: Option<String>,
    pub date: Option<String>,
    /// Plain text of the message, tags stripped and entities decoded
    pub content: String,
}

/// Messages of a reply body, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedThread {
    pub messages: Vec<Message>,
    /// Content of the newest message, empty when there are no messages
    pub current_message: String,
    pub client: ClientKind,
}

impl ParsedThread {
    pub fn new(client: ClientKind, messages: Vec<Message>) -> Self {
        let current_message = messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Self {
            messages,
            current_message,
            client,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Splits HTML reply bodies into their quoted messages.
#[derive(Debug, Clone, Default)]
pub struct ThreadParser {
    fingerprints: ClientFingerprints,
}

impl ThreadParser {
    pub fn new(fingerprints: ClientFingerprints) -> Self {
        Self { fingerprints }
    }

    /// Parse an HTML body into its messages.
    ///
    /// The body is sanitized first, then classified and split with the
    /// delimiter of its client. Fragments without any text are dropped.
    pub fn parse(&self, html: &str) -> ParsedThread {
        if html.trim().is_empty() {
            return ParsedThread::default();
        }

        let sanitized = sanitize_html(html);
        let client = self.fingerprints.detect(&sanitized);

        let messages: Vec<Message> = self
            .fingerprints
            .split(client, &sanitized)
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(extract_message_metadata)
            .filter(|message| !message.content.is_empty())
            .collect();

        tracing::debug!(
            "Parsed {} message(s) from {} body ({} bytes)",
            messages.len(),
            client,
            html.len()
        );

        ParsedThread::new(client, messages)
    }

    /// Byte offset in `html` where quoted history begins.
    pub fn quote_start(&self, html: &str) -> Option<usize> {
        self.fingerprints.quote_start(self.fingerprints.detect(html), html)
    }
}

/// Parse with the default client fingerprints.
pub fn parse_thread(html: &str) -> ParsedThread {
    DEFAULT_PARSER.parse(html)
}

/// Build a [`Message`] from one HTML fragment.
///
/// `From:` and `Date:` (or Outlook's `Sent:`) header lines are picked up when
/// present, otherwise a Gmail style "On <date> <sender> wrote:" line is used.
pub fn extract_message_metadata(part: &str) -> Message {
    let content = extract_plain_text(part);

    let mut from = first_capture(&FROM_LINE, &content);
    let mut date = first_capture(&DATE_LINE, &content);

    if (from.is_none() || date.is_none())
        && let Some(caps) = ATTRIBUTION_LINE.captures(&content)
    {
        if date.is_none() {
            date = non_empty(&caps[1]);
        }
        if from.is_none() {
            from = non_empty(&caps[2]);
        }
    }

    Message {
        from,
        date,
        content,
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|caps| non_empty(&caps[1]))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Render one message as optional `From:`/`Date:` lines followed by its content.
pub(crate) fn format_message(message: &Message) -> String {
    let mut block = String::with_capacity(message.content.len() + 64);
    if let Some(ref from) = message.from {
        block.push_str("From: ");
        block.push_str(from);
        block.push('\n');
    }
    if let Some(ref date) = message.date {
        block.push_str("Date: ");
        block.push_str(date);
        block.push('\n');
    }
    block.push_str(&message.content);
    block
}

pub(crate) fn join_blocks<I>(blocks: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let separator = format!("\n\n{}\n\n", MESSAGE_SEPARATOR);
    blocks.into_iter().collect::<Vec<_>>().join(&separator)
}

/// Flatten messages into the text handed to the summarizer, one block per
/// message separated by a `---` line.
pub fn combine_messages_for_context(messages: &[Message]) -> String {
    join_blocks(messages.iter().map(format_message))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLOOK_THREAD: &str = r#"<html><body>
<div><p>Sure, Thursday works for me.</p></div>
<div style="border:none;border-top:solid #B5C4DF 1.0pt;padding:3.0pt 0in 0in 0in">
<p><b>From:</b> Jane Roe &lt;jane@example.com&gt;<br>
<b>Sent:</b> Monday, March 4, 2024 9:12 AM<br>
<b>Subject:</b> Planning</p>
<p>Could we meet on Thursday?</p>
</div>
<div style="border:none;border-top:solid #B5C4DF 1.0pt;padding:3.0pt 0in 0in 0in">
<p><b>From:</b> John Doe<br><b>Date:</b> Sunday, March 3, 2024</p>
<p>Let's plan next week.</p>
</div>
</body></html>"#;

    const GMAIL_THREAD: &str = r#"<div dir="ltr">Newest reply here.</div><br>
<div class="gmail_quote"><div dir="ltr" class="gmail_attr">On Tue, Mar 5, 2024 at 10:15 AM Jane Roe &lt;jane@example.com&gt; wrote:<br></div>
<blockquote class="gmail_quote"><div dir="ltr">Middle message.</div><br>
<div class="gmail_quote"><div dir="ltr" class="gmail_attr">On Mon, Mar 4, 2024 at 9:00 AM John Doe &lt;john@example.com&gt; wrote:<br></div>
<blockquote class="gmail_quote"><div dir="ltr">Oldest message.</div></blockquote></div>
</blockquote></div>"#;

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_thread(""), ParsedThread::default());
        let parsed = parse_thread("   \n ");
        assert!(parsed.messages.is_empty());
        assert_eq!(parsed.current_message, "");
    }

    #[test]
    fn test_parse_outlook_thread() {
        let parsed = parse_thread(OUTLOOK_THREAD);
        assert_eq!(parsed.client, ClientKind::Outlook);
        assert_eq!(parsed.len(), 3);

        assert_eq!(parsed.current_message, "Sure, Thursday works for me.");
        assert_eq!(parsed.messages[0].from, None);

        let second = &parsed.messages[1];
        assert_eq!(second.from.as_deref(), Some("Jane Roe <jane@example.com>"));
        assert_eq!(second.date.as_deref(), Some("Monday, March 4, 2024 9:12 AM"));
        assert!(second.content.contains("Could we meet on Thursday?"));

        let third = &parsed.messages[2];
        assert_eq!(third.from.as_deref(), Some("John Doe"));
        assert_eq!(third.date.as_deref(), Some("Sunday, March 3, 2024"));
    }

    #[test]
    fn test_parse_gmail_thread_newest_first() {
        let parsed = parse_thread(GMAIL_THREAD);
        assert_eq!(parsed.client, ClientKind::Gmail);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.current_message, "Newest reply here.");

        assert!(parsed.messages[1].content.contains("Middle message."));
        assert_eq!(
            parsed.messages[1].from.as_deref(),
            Some("Jane Roe <jane@example.com>")
        );
        assert_eq!(
            parsed.messages[1].date.as_deref(),
            Some("Tue, Mar 5, 2024 at 10:15 AM")
        );
        assert!(parsed.messages[2].content.contains("Oldest message."));
        assert_eq!(
            parsed.messages[2].from.as_deref(),
            Some("John Doe <john@example.com>")
        );
    }

    #[test]
    fn test_parse_unknown_splits_on_hr() {
        let parsed = parse_thread("<p>New text</p><hr><p>From: Someone</p><p>Old text</p>");
        assert_eq!(parsed.client, ClientKind::Unknown);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.messages[1].from.as_deref(), Some("Someone"));
    }

    #[test]
    fn test_parse_single_message() {
        let parsed = parse_thread("<p>Just one message &amp; nothing quoted.</p>");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.current_message, "Just one message & nothing quoted.");
    }

    #[test]
    fn test_parse_drops_empty_fragments() {
        let parsed = parse_thread("<hr><p>Body</p><hr><div> </div>");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.current_message, "Body");
    }

    #[test]
    fn test_parse_strips_active_content() {
        let parsed = parse_thread("<p onclick=\"x()\">Hello</p><script>alert('no')</script>");
        assert_eq!(parsed.current_message, "Hello");
    }

    #[test]
    fn test_parse_is_stable_under_sanitize() {
        for html in [OUTLOOK_THREAD, GMAIL_THREAD, "<scr<script></script>ipt>x</script><p>y</p>"] {
            assert_eq!(parse_thread(&sanitize_html(html)), parse_thread(html));
        }
    }

    #[test]
    fn test_current_message_matches_first() {
        for html in [OUTLOOK_THREAD, GMAIL_THREAD, "", "<p>a</p>"] {
            let parsed = parse_thread(html);
            let first = parsed
                .messages
                .first()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            assert_eq!(parsed.current_message, first);
        }
    }

    #[test]
    fn test_metadata_absent_fields_stay_none() {
        let message = extract_message_metadata("<p>No headers at all</p>");
        assert_eq!(message.from, None);
        assert_eq!(message.date, None);
        assert_eq!(message.content, "No headers at all");
    }

    #[test]
    fn test_metadata_ignores_inline_from() {
        let message = extract_message_metadata("<p>A quote from: the manual</p>");
        assert_eq!(message.from, None);
    }

    #[test]
    fn test_combine_messages_for_context() {
        let messages = vec![
            Message {
                from: Some("Jane".to_string()),
                date: Some("Monday".to_string()),
                content: "Newest".to_string(),
            },
            Message {
                from: None,
                date: None,
                content: "Older".to_string(),
            },
        ];
        assert_eq!(
            combine_messages_for_context(&messages),
            "From: Jane\nDate: Monday\nNewest\n\n---\n\nOlder"
        );
        assert_eq!(combine_messages_for_context(&[]), "");
    }
}
