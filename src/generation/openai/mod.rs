#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::generation::{CompletionRequest, TextGenerator};
use crate::http::{HttpClient, Retry, join_url};
use crate::{RagError, Result};

/// Client for OpenAI-compatible `/chat/completions` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    endpoint: String,
    model: String,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    /// `api_key` may be `None` for local servers that take no credentials.
    #[inline]
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RagError::Config(format!("Invalid URL format: {base_url}: {e}")))?;

        // completions are not idempotent, so the client never retries
        let mut http = HttpClient::new(timeout, 1);
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            http = http.with_header("Authorization", &format!("Bearer {key}"));
        }

        Ok(Self {
            endpoint: join_url(base_url.as_str(), "chat/completions"),
            model: model.to_string(),
            http,
        })
    }
}

impl TextGenerator for OpenAiChatClient {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(
            "Requesting completion from {} ({} prompt characters)",
            self.model,
            request.prompt.chars().count()
        );

        let response: ChatResponse = self
            .http
            .post_json(&self.endpoint, &body, Retry::Never)
            .map_err(|e| RagError::Generation(format!("{} request failed: {e}", self.model)))?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}
