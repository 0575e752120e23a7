//! In-memory body and scripted service for exercising the pipeline

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{GenerationOutput, GenerationRequest, GenerationService, TokenUsage};
use super::error::GenerationError;
use crate::mail::{BodyError, MailBody};

pub(crate) struct MemoryBody {
    html: Option<String>,
    fail_write: bool,
    written: Mutex<Option<String>>,
}

impl MemoryBody {
    pub(crate) fn new(html: &str) -> Self {
        Self {
            html: Some(html.to_string()),
            fail_write: false,
            written: Mutex::new(None),
        }
    }

    pub(crate) fn failing_read() -> Self {
        Self {
            html: None,
            fail_write: false,
            written: Mutex::new(None),
        }
    }

    pub(crate) fn with_failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub(crate) fn written(&self) -> Option<String> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailBody for MemoryBody {
    async fn get_body(&self) -> Result<String, BodyError> {
        self.html
            .clone()
            .ok_or_else(|| BodyError::Read("mailbox unavailable".to_string()))
    }

    async fn set_body(&self, html: String) -> Result<(), BodyError> {
        if self.fail_write {
            return Err(BodyError::Write("compose window closed".to_string()));
        }
        *self.written.lock().unwrap() = Some(html);
        Ok(())
    }
}

/// Replays canned results in order. Requests whose prompt is listed in
/// `hang_prompts` (or all of them with `hanging()`) never complete.
pub(crate) struct ScriptedService {
    replies: Mutex<VecDeque<Result<GenerationOutput, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    hang_all: bool,
    hang_prompts: Vec<String>,
}

impl ScriptedService {
    pub(crate) fn new(replies: Vec<Result<GenerationOutput, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            hang_all: false,
            hang_prompts: Vec::new(),
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            hang_all: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn hanging_on(
        prompt: &str,
        replies: Vec<Result<GenerationOutput, GenerationError>>,
    ) -> Self {
        Self {
            hang_prompts: vec![prompt.to_string()],
            ..Self::new(replies)
        }
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.hang_all || self.hang_prompts.contains(&request.prompt_text) {
            std::future::pending::<()>().await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(GenerationError::Unknown("no scripted reply".to_string())))
    }
}

pub(crate) fn reply(text: &str, total_tokens: Option<usize>) -> Result<GenerationOutput, GenerationError> {
    Ok(GenerationOutput {
        text: text.to_string(),
        usage: total_tokens.map(|total| TokenUsage {
            prompt_tokens: total.saturating_sub(10),
            completion_tokens: total.min(10),
            total_tokens: total,
        }),
    })
}
