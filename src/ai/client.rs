//! Chat completions client and the generation service boundary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::error::GenerationError;
use super::prompts;

/// What the orchestrator hands to the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Thread text after summarization
    pub email_content: String,
    pub prompt_text: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    /// Not every compatible server reports usage
    pub usage: Option<TokenUsage>,
}

/// Anything that can turn a request into generated text.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError>;
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<serde_json::Value>,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: String, max_tokens: u32, temperature: f32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens,
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatRequest {
        ChatRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompts::REPLY_SYSTEM.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompts::reply_user_content(
                        &request.prompt_text,
                        &request.email_content,
                    ),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Send a chat completion request
    pub async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!("Chat completions error ({}): {}", status, error_text);
            return Err(map_error_status(status, &error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Unknown(format!("unreadable response: {}", e)))?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Unknown("no response content".to_string()))?;

        Ok(GenerationOutput {
            text,
            usage: chat_response.usage,
        })
    }
}

#[async_trait]
impl GenerationService for ChatClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        self.complete(request).await
    }
}

/// Translate a non-success status and its body into a [`GenerationError`].
pub(crate) fn map_error_status(status: StatusCode, body: &str) -> GenerationError {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::InvalidCredential,
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited,
        StatusCode::BAD_REQUEST if mentions_content_policy(detail.as_ref(), &message) => {
            GenerationError::ContentPolicy(message)
        }
        s if s.is_server_error() => GenerationError::Network(format!("{}: {}", s, message)),
        s => GenerationError::Unknown(format!("{}: {}", s, message)),
    }
}

fn mentions_content_policy(detail: Option<&ApiErrorDetail>, message: &str) -> bool {
    let mut haystack = message.to_lowercase();
    if let Some(detail) = detail {
        if let Some(kind) = &detail.kind {
            haystack.push(' ');
            haystack.push_str(&kind.to_lowercase());
        }
        if let Some(serde_json::Value::String(code)) = &detail.code {
            haystack.push(' ');
            haystack.push_str(&code.to_lowercase());
        }
    }

    ["content_policy", "content policy", "content_filter", "content filter"]
        .iter()
        .any(|needle| haystack.contains(needle))
}
