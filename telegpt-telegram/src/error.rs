use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    /// Connection reset, DNS failure, request timeout.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("telegram api error status={status:?} code={code:?}: {description}")]
    Api {
        status: Option<u16>,
        code: Option<i64>,
        description: String,
    },

    #[error("decode error: {0}")]
    Decode(String),
}

impl TelegramError {
    pub fn is_transient(&self) -> bool {
        match self {
            TelegramError::Transport(_) => true,
            TelegramError::Api { status, code, .. } => {
                let status = status.or_else(|| code.and_then(|c| u16::try_from(c).ok()));
                matches!(status, Some(408 | 429) | Some(500..=599))
            }
            TelegramError::Decode(_) => false,
        }
    }

    /// `editMessageText` with identical content is rejected by the API; callers
    /// usually treat that as success.
    pub fn is_message_not_modified(&self) -> bool {
        matches!(
            self,
            TelegramError::Api { description, .. } if description.contains("message is not modified")
        )
    }
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for TelegramError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
