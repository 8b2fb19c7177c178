use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAI,
    Anthropic,
    DeepSeek,
}

impl Provider {
    pub fn label(self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::DeepSeek => "DeepSeek",
        }
    }
}

/// User-selectable model families. The key is what gets persisted per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    ChatGpt,
    Claude,
    DeepSeek,
}

impl ModelKind {
    /// Catalog in default-selection priority order.
    pub const ALL: [ModelKind; 3] = [ModelKind::ChatGpt, ModelKind::Claude, ModelKind::DeepSeek];

    pub fn key(self) -> &'static str {
        match self {
            ModelKind::ChatGpt => "chatgpt",
            ModelKind::Claude => "claude",
            ModelKind::DeepSeek => "deepseek",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::ChatGpt => "ChatGPT",
            ModelKind::Claude => "Claude",
            ModelKind::DeepSeek => "DeepSeek",
        }
    }

    pub fn provider(self) -> Provider {
        match self {
            ModelKind::ChatGpt => Provider::OpenAI,
            ModelKind::Claude => Provider::Anthropic,
            ModelKind::DeepSeek => Provider::DeepSeek,
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
