use crate::catalog::ModelKind;
use crate::client::ProviderClient;
use crate::error::{LlmError, Result};
use crate::types::ChatMessage;
use async_trait::async_trait;

/// Uniform capability every model backend exposes to the bot.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate a reply to `text`. `context` is prior conversation, already formatted.
    async fn generate_response(&self, text: &str, context: Option<&str>) -> Result<String>;

    fn is_available(&self) -> bool;

    /// Human-readable name, e.g. `ChatGPT (gpt-3.5-turbo)`.
    fn display_name(&self) -> String;
}

/// [`Backend`] implementation over a real provider HTTP API.
pub struct ProviderBackend {
    kind: ModelKind,
    client: ProviderClient,
}

impl ProviderBackend {
    pub fn new(kind: ModelKind, client: ProviderClient) -> Self {
        Self { kind, client }
    }
}

#[async_trait]
impl Backend for ProviderBackend {
    async fn generate_response(&self, text: &str, context: Option<&str>) -> Result<String> {
        if !self.is_available() {
            return Err(LlmError::Unavailable(self.display_name()));
        }
        let messages = compose_messages(text, context);
        let response = self.client.chat(&messages).await?;
        tracing::debug!(
            model = %self.client.model(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = %response.finish_reason,
            "completion received"
        );
        let answer = response.message.content.trim();
        if answer.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(answer.to_string())
    }

    fn is_available(&self) -> bool {
        self.client.has_credentials()
    }

    fn display_name(&self) -> String {
        format!("{} ({})", self.kind.name(), self.client.model())
    }
}

fn compose_messages(text: &str, context: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        messages.push(ChatMessage::system(context));
    }
    messages.push(ChatMessage::user(text));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationParams, Role};
    use std::time::Duration;

    fn backend(kind: ModelKind, key: &str, model: &str) -> ProviderBackend {
        let client = ProviderClient::new(
            kind.provider(),
            key,
            model,
            GenerationParams::default(),
            Duration::from_secs(5),
        );
        ProviderBackend::new(kind, client)
    }

    #[test]
    fn context_becomes_leading_system_message() {
        let messages = compose_messages("question", Some("User: a\n\nAssistant: b"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], ChatMessage::user("question"));

        let bare = compose_messages("question", Some("   "));
        assert_eq!(bare, vec![ChatMessage::user("question")]);
    }

    #[test]
    fn display_name_includes_model_id() {
        let b = backend(ModelKind::ChatGpt, "sk-test", "gpt-3.5-turbo");
        assert_eq!(b.display_name(), "ChatGPT (gpt-3.5-turbo)");
    }

    #[tokio::test]
    async fn blank_key_is_unavailable_and_short_circuits() {
        let b = backend(ModelKind::Claude, "  ", "claude-3-sonnet-20240229");
        assert!(!b.is_available());
        let err = b
            .generate_response("hi", None)
            .await
            .expect_err("unavailable backend must not call out");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }
}
