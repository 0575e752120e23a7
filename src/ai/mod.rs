//! Reply generation
//!
//! - `client`: the generation service boundary and an OpenAI-compatible client
//! - `pipeline`: the orchestrator tying body access, parsing, summarization
//!   and generation together
//! - `actor`: a background task running one generation at a time

mod actor;
mod client;
mod error;
mod pipeline;
mod prompts;
#[cfg(test)]
mod testing;

pub use actor::{GenerationActorHandle, GenerationCommand, GenerationEvent, spawn_generation_actor};
pub use client::{
    ChatClient, GenerationOutput, GenerationRequest, GenerationService, TokenUsage,
};
pub use error::GenerationError;
pub use pipeline::{GenerationResponse, Orchestrator};
