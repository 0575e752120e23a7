//! Email thread understanding and reply drafting
//!
//! Parses quoted HTML threads from Outlook and Gmail, finds signatures, fits
//! a thread into a model's token budget, and drafts a reply that is inserted
//! above the sender's signature.

pub mod ai;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod mail;
pub mod summarize;
pub mod tokens;
