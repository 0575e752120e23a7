//! Prompts for reply generation

/// System prompt for drafting a reply to an email thread
pub const REPLY_SYSTEM: &str = r#"You are an email writing assistant. Write the body of a reply to the email thread you are given, following the user's instructions. Match the tone of the conversation and answer the most recent message. Return only the reply text, without a subject line, signature, or any commentary. Do not repeat the quoted thread."#;

/// User message: the instructions followed by the (possibly summarized) thread.
pub fn reply_user_content(prompt_text: &str, email_content: &str) -> String {
    format!(
        "Instructions:\n{}\n\nEmail thread:\n{}",
        prompt_text.trim(),
        email_content
    )
}
