//! Reply generation: read the body, fit the thread into the model window,
//! generate, and write the reply back above the signature.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::client::{GenerationRequest, GenerationService, TokenUsage};
use super::error::GenerationError;
use crate::config::Config;
use super::prompts;
use crate::mail::{ClientFingerprints, MailBody, ThreadParser, insert_above_signature_before};
use crate::summarize::{SummaryStats, summarize_thread};
use crate::tokens::{calculate_cost, count_tokens, model_limit};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    pub generated_text: String,
    pub tokens_used: Option<TokenUsage>,
    pub elapsed: Duration,
    pub was_summarized: bool,
    /// USD, when the service reported usage
    pub estimated_cost: Option<f64>,
}

pub struct Orchestrator<S> {
    service: S,
    parser: ThreadParser,
    model: String,
    response_reserve_tokens: usize,
    min_context_tokens: usize,
    stats: Mutex<SummaryStats>,
}

impl<S: GenerationService> Orchestrator<S> {
    pub fn new(service: S, config: &Config) -> Self {
        Self {
            service,
            parser: ThreadParser::new(ClientFingerprints::new(
                &config.detection.outlook_separator_colors,
            )),
            model: config.ai.model.clone(),
            response_reserve_tokens: config.context.response_reserve_tokens,
            min_context_tokens: config.context.min_context_tokens,
            stats: Mutex::new(SummaryStats::default()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Totals over every summarization this orchestrator has done.
    pub fn summary_stats(&self) -> SummaryStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tokens the thread may use once the reply and the rest of the request
    /// (system prompt, instructions and their framing) are accounted for.
    pub fn context_budget(&self, prompt_text: &str) -> usize {
        let framing = count_tokens(prompts::REPLY_SYSTEM, &self.model)
            + count_tokens(&prompts::reply_user_content(prompt_text, ""), &self.model);
        model_limit(&self.model)
            .saturating_sub(self.response_reserve_tokens)
            .saturating_sub(framing)
            .max(self.min_context_tokens)
    }

    /// Generate a reply to the thread in `body` and insert it above the signature.
    ///
    /// Once `cancel` fires, the body is left untouched.
    pub async fn generate<B: MailBody>(
        &self,
        body: &B,
        prompt_text: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, GenerationError> {
        let started = Instant::now();

        let html = body.get_body().await?;
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let thread = self.parser.parse(&html);
        if thread.is_empty() {
            return Err(GenerationError::NoContent);
        }

        let budget = self.context_budget(prompt_text);
        let summary = summarize_thread(&thread.messages, budget, &self.model);
        tracing::debug!(
            "{} thread with {} messages: {} tokens (budget {}, summarized: {})",
            thread.client,
            thread.len(),
            summary.final_token_count,
            budget,
            summary.was_summarized
        );
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&summary);

        let request = GenerationRequest {
            email_content: summary.content,
            prompt_text: prompt_text.to_string(),
            model: self.model.clone(),
            timestamp: Utc::now(),
        };

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            result = self.service.generate(&request) => result?,
        };
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let generated_text = output.text.trim().to_string();
        if generated_text.is_empty() {
            return Err(GenerationError::Unknown(
                "service returned an empty reply".to_string(),
            ));
        }

        let updated =
            insert_above_signature_before(&html, &generated_text, self.parser.quote_start(&html));
        if let Err(e) = body.set_body(updated).await {
            tracing::warn!("Failed to write reply: {}", e);
            return Err(e.into());
        }

        let elapsed = started.elapsed();
        let estimated_cost = output
            .usage
            .map(|u| calculate_cost(u.prompt_tokens, u.completion_tokens, &self.model));
        tracing::info!(
            "Generated reply with {} in {:.1}s ({} tokens)",
            self.model,
            elapsed.as_secs_f64(),
            output.usage.map(|u| u.total_tokens).unwrap_or_default()
        );

        Ok(GenerationResponse {
            generated_text,
            tokens_used: output.usage,
            elapsed,
            was_summarized: summary.was_summarized,
            estimated_cost,
        })
    }
}
