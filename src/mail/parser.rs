use mail_parser::{MessageParser, MimeHeaders, PartType};

use super::html::text_to_html;

/// Extract an HTML body from a raw RFC 5322 message.
///
/// The HTML part is preferred; a plain-text part is converted to HTML. Returns
/// `None` when the message can't be parsed or has no text at all.
pub fn html_from_message(raw: &[u8]) -> Option<String> {
    let message = MessageParser::default().parse(raw)?;

    extract_html_body(&message).or_else(|| extract_text_body(&message).map(|t| text_to_html(&t)))
}

/// Whether `raw` looks like a full message (headers + body) rather than a bare
/// HTML fragment.
pub fn looks_like_message(raw: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&raw[..raw.len().min(2048)]);
    let first_line = head.lines().next().unwrap_or_default();
    !first_line.trim_start().starts_with('<')
        && head.lines().take_while(|l| !l.trim().is_empty()).any(|l| {
            let lower = l.to_ascii_lowercase();
            lower.starts_with("from:")
                || lower.starts_with("subject:")
                || lower.starts_with("content-type:")
                || lower.starts_with("mime-version:")
        })
}

fn extract_html_body(message: &mail_parser::Message) -> Option<String> {
    for part in message.html_bodies() {
        if let PartType::Html(html) = &part.body {
            return Some(html.to_string());
        }
    }

    None
}

fn extract_text_body(message: &mail_parser::Message) -> Option<String> {
    for part in message.text_bodies() {
        if let PartType::Text(text) = &part.body {
            return Some(text.to_string());
        }
    }

    // Fallback: any text/plain part
    for part in message.parts.iter() {
        if let PartType::Text(text) = &part.body {
            let content_type = part.content_type();
            if content_type
                .map(|ct| ct.subtype() == Some("plain"))
                .unwrap_or(true)
            {
                return Some(text.to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_part_preferred() {
        let raw = b"From: sender@example.com\r\n\
                    To: recipient@example.com\r\n\
                    Subject: Test Email\r\n\
                    MIME-Version: 1.0\r\n\
                    Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
                    \r\n\
                    --b1\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    Plain version\r\n\
                    --b1\r\n\
                    Content-Type: text/html\r\n\
                    \r\n\
                    <p>HTML version</p>\r\n\
                    --b1--\r\n";

        let html = html_from_message(raw).unwrap();
        assert!(html.contains("<p>HTML version</p>"));
    }

    #[test]
    fn test_plain_text_converted() {
        let raw = b"From: sender@example.com\r\n\
                    Subject: Test Email\r\n\
                    \r\n\
                    Hello, this is a test email.";

        let html = html_from_message(raw).unwrap();
        assert!(html.starts_with("<div>"));
        assert!(html.contains("Hello, this is a test email."));
    }

    #[test]
    fn test_looks_like_message() {
        assert!(looks_like_message(b"From: a@b.co\r\nSubject: x\r\n\r\nbody"));
        assert!(!looks_like_message(b"<html><body>From: a@b.co</body></html>"));
        assert!(!looks_like_message(b"just some text"));
    }
}
