//! TeleGPT configuration loader.
//!
//! Optional TOML file, then `.env`, then process environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use telegpt_llm::{GenerationParams, ModelSettings, ProviderKeys};

pub const DEFAULT_CONFIG_FILE: &str = "telegpt.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeleGptConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_api_base_url() -> String {
    telegpt_telegram::DEFAULT_API_BASE_URL.to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: default_api_base_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_chatgpt_model")]
    pub chatgpt: String,
    #[serde(default = "default_claude_model")]
    pub claude: String,
    #[serde(default = "default_deepseek_model")]
    pub deepseek: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_chatgpt_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_claude_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_deepseek_model() -> String {
    "deepseek-chat".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            chatgpt: default_chatgpt_model(),
            claude: default_claude_model(),
            deepseek: default_deepseek_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Adaptive long-poll cadence. All durations are milliseconds unless named `_secs`.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_slow_interval_ms")]
    pub slow_interval_ms: u64,
    #[serde(default = "default_fast_interval_ms")]
    pub fast_interval_ms: u64,
    /// Active users older than this are purged even without an explicit deactivation.
    #[serde(default = "default_activity_timeout_ms")]
    pub activity_timeout_ms: u64,
    /// Delay between handler completion and user deactivation.
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,
    #[serde(default = "default_long_poll_timeout_secs")]
    pub long_poll_timeout_secs: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_queue_pop_timeout_ms")]
    pub queue_pop_timeout_ms: u64,
    #[serde(default)]
    pub initial_offset: i64,
}

fn default_slow_interval_ms() -> u64 {
    10_000
}

fn default_fast_interval_ms() -> u64 {
    2_000
}

fn default_activity_timeout_ms() -> u64 {
    20_000
}

fn default_grace_delay_ms() -> u64 {
    3_000
}

fn default_long_poll_timeout_secs() -> u64 {
    5
}

fn default_batch_limit() -> u32 {
    100
}

fn default_retry_backoff_ms() -> u64 {
    5_000
}

fn default_queue_pop_timeout_ms() -> u64 {
    1_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            slow_interval_ms: default_slow_interval_ms(),
            fast_interval_ms: default_fast_interval_ms(),
            activity_timeout_ms: default_activity_timeout_ms(),
            grace_delay_ms: default_grace_delay_ms(),
            long_poll_timeout_secs: default_long_poll_timeout_secs(),
            batch_limit: default_batch_limit(),
            retry_backoff_ms: default_retry_backoff_ms(),
            queue_pop_timeout_ms: default_queue_pop_timeout_ms(),
            initial_offset: 0,
        }
    }
}

impl PollingConfig {
    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn activity_timeout(&self) -> Duration {
        Duration::from_millis(self.activity_timeout_ms)
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn queue_pop_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_pop_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "telegpt.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// How many previous turns feed the model as context.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

fn default_context_turns() -> usize {
    5
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            context_turns: default_context_turns(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Fallback level when `RUST_LOG` is unset, e.g. `info` or `debug`.
    #[serde(default)]
    pub level: Option<String>,
}

impl TeleGptConfig {
    /// Load from `path`, `$TELEGPT_CONFIG`, or `./telegpt.toml` when present,
    /// then apply environment overrides. A missing default file is not an
    /// error; an explicit missing path is. Callers run [`Self::validate`].
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.or_else(|| {
            std::env::var("TELEGPT_CONFIG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        });

        let mut cfg = match explicit {
            Some(path) => Self::from_file(&path).await?,
            None => {
                let path = default_config_path();
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Self::from_file(&path).await?
                } else {
                    Self::default()
                }
            }
        };

        cfg.apply_env_overrides();
        Ok(cfg)
    }

    async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
        Self::from_toml(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.keys.openai_api_key = Some(v);
        }
        if let Some(v) = var("ANTHROPIC_API_KEY") {
            self.keys.anthropic_api_key = Some(v);
        }
        if let Some(v) = var("DEEPSEEK_API_KEY") {
            self.keys.deepseek_api_key = Some(v);
        }
        if let Some(v) = var("DATABASE_URL") {
            self.storage.database_path = sqlite_path_from_url(&v);
        }
        if let Some(v) = var("DATABASE_PATH") {
            self.storage.database_path = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = Some(v);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "telegram.bot_token is required (or set TELEGRAM_BOT_TOKEN)"
            ));
        }
        let p = &self.polling;
        for (name, value) in [
            ("polling.slow_interval_ms", p.slow_interval_ms),
            ("polling.fast_interval_ms", p.fast_interval_ms),
            ("polling.activity_timeout_ms", p.activity_timeout_ms),
            ("polling.grace_delay_ms", p.grace_delay_ms),
            ("polling.long_poll_timeout_secs", p.long_poll_timeout_secs),
            ("polling.retry_backoff_ms", p.retry_backoff_ms),
            ("polling.queue_pop_timeout_ms", p.queue_pop_timeout_ms),
        ] {
            if value == 0 {
                return Err(anyhow::anyhow!("{name} must be > 0"));
            }
        }
        if p.fast_interval_ms > p.slow_interval_ms {
            return Err(anyhow::anyhow!(
                "polling.fast_interval_ms ({}) must not exceed polling.slow_interval_ms ({})",
                p.fast_interval_ms,
                p.slow_interval_ms
            ));
        }
        if !(1..=100).contains(&p.batch_limit) {
            return Err(anyhow::anyhow!("polling.batch_limit must be within 1..=100"));
        }
        if p.initial_offset < 0 {
            return Err(anyhow::anyhow!(
                "polling.initial_offset must be >= 0 (got {})",
                p.initial_offset
            ));
        }
        if !(0.0..=2.0).contains(&self.models.temperature) {
            return Err(anyhow::anyhow!("models.temperature must be within 0.0..=2.0"));
        }
        if self.models.max_tokens == 0 {
            return Err(anyhow::anyhow!("models.max_tokens must be > 0"));
        }
        if self.conversation.context_turns > 50 {
            return Err(anyhow::anyhow!("conversation.context_turns must be <= 50"));
        }
        if self.storage.database_path.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.database_path is required"));
        }
        Ok(())
    }

    pub fn provider_keys(&self) -> ProviderKeys {
        ProviderKeys {
            openai_api_key: self.keys.openai_api_key.clone(),
            anthropic_api_key: self.keys.anthropic_api_key.clone(),
            deepseek_api_key: self.keys.deepseek_api_key.clone(),
        }
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            chatgpt: self.models.chatgpt.clone(),
            claude: self.models.claude.clone(),
            deepseek: self.models.deepseek.clone(),
            params: GenerationParams {
                max_tokens: self.models.max_tokens,
                temperature: self.models.temperature,
            },
            request_timeout: Duration::from_secs(self.models.request_timeout_secs),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Accepts `sqlite:///telegpt.db`, `sqlite://telegpt.db` or a bare path.
fn sqlite_path_from_url(url: &str) -> String {
    let url = url.trim();
    url.strip_prefix("sqlite:///")
        .or_else(|| url.strip_prefix("sqlite://"))
        .unwrap_or(url)
        .to_string()
}
