use async_trait::async_trait;
use portal_core::{Fragment, Message};
use reqwest::Client;

use crate::error::{LLMError, Result};
use crate::openai_compat::{build_chat_body, ChatResponse, FINISH_LENGTH};
use crate::provider::{Completion, CompletionOptions, CompletionProvider, CompletionStream};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Provider for any endpoint speaking the OpenAI chat-completions dialect.
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    async fn complete(&self, turns: &[Message], options: &CompletionOptions) -> Result<Completion> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        if options.model.is_some() {
            log::debug!(
                "Completion using override model '{}' (default: '{}')",
                model,
                self.model
            );
        }

        let body = build_chat_body(model, turns, options.stream);
        let request = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => return Err(LLMError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            log::warn!("Completion request failed: HTTP {}", status);
            return Err(LLMError::from_response(status.as_u16(), &text));
        }

        if options.stream {
            return Ok(Completion::Streamed(CompletionStream::new(
                response.bytes_stream(),
                options.cancel.clone(),
            )));
        }

        let reply: ChatResponse = response.json().await?;
        if reply.finish_reason() == Some(FINISH_LENGTH) {
            log::warn!("Completion stopped at the token limit");
        }
        Ok(Completion::Single(Fragment::text(reply.into_text())))
    }
}
