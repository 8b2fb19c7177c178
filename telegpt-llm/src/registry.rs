use crate::backend::{Backend, ProviderBackend};
use crate::catalog::ModelKind;
use crate::client::ProviderClient;
use crate::types::GenerationParams;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
}

impl ProviderKeys {
    fn key_for(&self, kind: ModelKind) -> Option<&str> {
        let key = match kind {
            ModelKind::ChatGpt => self.openai_api_key.as_deref(),
            ModelKind::Claude => self.anthropic_api_key.as_deref(),
            ModelKind::DeepSeek => self.deepseek_api_key.as_deref(),
        };
        key.map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub chatgpt: String,
    pub claude: String,
    pub deepseek: String,
    pub params: GenerationParams,
    pub request_timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            chatgpt: "gpt-3.5-turbo".to_string(),
            claude: "claude-3-sonnet-20240229".to_string(),
            deepseek: "deepseek-chat".to_string(),
            params: GenerationParams::default(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ModelSettings {
    fn model_id(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::ChatGpt => &self.chatgpt,
            ModelKind::Claude => &self.claude,
            ModelKind::DeepSeek => &self.deepseek,
        }
    }
}

/// Backends constructed once at startup and shared by reference afterwards.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<ModelKind, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Build one backend per model whose credentials are present.
    /// Missing keys leave that model unavailable; they never fail startup.
    pub fn from_config(keys: &ProviderKeys, settings: &ModelSettings) -> Self {
        let mut registry = Self::default();
        for kind in ModelKind::ALL {
            let Some(api_key) = keys.key_for(kind) else {
                tracing::warn!(
                    model = %kind,
                    provider = kind.provider().label(),
                    "api key not configured; model unavailable"
                );
                continue;
            };
            let client = ProviderClient::new(
                kind.provider(),
                api_key,
                settings.model_id(kind),
                settings.params,
                settings.request_timeout,
            );
            registry.insert(kind, Arc::new(ProviderBackend::new(kind, client)));
        }
        registry
    }

    pub fn insert(&mut self, kind: ModelKind, backend: Arc<dyn Backend>) {
        self.backends.insert(kind, backend);
    }

    /// The backend for `kind`, if it exists and reports itself available.
    pub fn get(&self, kind: ModelKind) -> Option<Arc<dyn Backend>> {
        self.backends
            .get(&kind)
            .filter(|backend| backend.is_available())
            .cloned()
    }

    pub fn is_available(&self, kind: ModelKind) -> bool {
        self.get(kind).is_some()
    }

    /// Available models in catalog order.
    pub fn available(&self) -> Vec<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
            .collect()
    }

    /// First available model by priority; ChatGPT when nothing is configured.
    pub fn default_model(&self) -> ModelKind {
        self.available()
            .first()
            .copied()
            .unwrap_or(ModelKind::ChatGpt)
    }
}
