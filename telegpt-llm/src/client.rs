use crate::anthropic::AnthropicClient;
use crate::catalog::Provider;
use crate::error::Result;
use crate::openai::{DEEPSEEK_BASE_URL, OPENAI_BASE_URL, OpenAiClient};
use crate::types::{ChatMessage, ChatResponse, GenerationParams};
use std::time::Duration;

/// Provider-agnostic chat client: one API key, one model id.
#[derive(Clone)]
pub struct ProviderClient {
    provider: Provider,
    api_key: String,
    model: String,
    params: GenerationParams,
    client: reqwest::Client,
}

impl ProviderClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        provider: Provider,
        api_key: &str,
        model: &str,
        params: GenerationParams,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self {
            provider,
            api_key: api_key.to_string(),
            model: model.to_string(),
            params,
            client,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    #[tracing::instrument(level = "info", skip_all, fields(provider = ?self.provider))]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        match self.provider {
            Provider::OpenAI => {
                let c = OpenAiClient::new(
                    self.client.clone(),
                    OPENAI_BASE_URL,
                    &self.api_key,
                    &self.model,
                );
                c.chat(messages, self.params).await
            }
            Provider::DeepSeek => {
                let c = OpenAiClient::new(
                    self.client.clone(),
                    DEEPSEEK_BASE_URL,
                    &self.api_key,
                    &self.model,
                );
                c.chat(messages, self.params).await
            }
            Provider::Anthropic => {
                let c = AnthropicClient::new(self.client.clone(), &self.api_key, &self.model);
                c.chat(messages, self.params).await
            }
        }
    }
}
