pub mod body;
pub mod client;
pub mod html;
pub mod parser;
pub mod signature;
pub mod thread;

pub use body::{BodyError, FileBody, MailBody};
pub use client::{ClientFingerprints, ClientKind, detect_email_client, quote_start};
pub use html::{extract_plain_text, sanitize_html};
pub use signature::{
    detect_signature, extract_signature, insert_above_signature, insert_above_signature_before,
    is_likely_signature, signature_confidence,
};
pub use thread::{
    Message, ParsedThread, ThreadParser, combine_messages_for_context, extract_message_metadata,
    parse_thread,
};
