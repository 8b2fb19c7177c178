use crate::error::{Result, TelegramError};
use crate::traits::{Messenger, UpdateSource};
use crate::types::{
    ChatAction, GetUpdates, InlineKeyboardMarkup, OutgoingMessage, ParseMode, Update,
    decode_updates,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
// Headroom on top of the server-side long-poll wait before the HTTP call is abandoned.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base_url: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self> {
        Self::with_base_url(bot_token, DEFAULT_API_BASE_URL)
    }

    pub fn with_base_url(bot_token: &str, api_base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base_url, self.bot_token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(self.api_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: ApiEnvelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(error) if !status.is_success() => {
                return Err(TelegramError::Api {
                    status: Some(status.as_u16()),
                    code: None,
                    description: format!("{text} ({error})"),
                });
            }
            Err(error) => return Err(error.into()),
        };
        envelope.into_result(status.as_u16())
    }

    /// Fetch the bot's own profile; used as a startup credential check.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn get_me(&self) -> Result<crate::types::User> {
        self.call("getMe", &serde_json::json!({}), None).await
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl<T> ApiEnvelope<T> {
    fn into_result(self, status: u16) -> Result<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TelegramError::Decode(
                "telegram response ok=true without result".to_string(),
            )),
            (false, _) => Err(TelegramError::Api {
                status: Some(status),
                code: self.error_code,
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct EditMessageTextBody<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryBody<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendChatActionBody {
    chat_id: i64,
    action: ChatAction,
}

#[async_trait]
impl UpdateSource for TelegramClient {
    #[tracing::instrument(level = "debug", skip_all, fields(offset = request.offset, timeout = request.timeout))]
    async fn get_updates(&self, request: &GetUpdates) -> Result<Vec<Update>> {
        let timeout = Duration::from_secs(request.timeout) + LONG_POLL_GRACE;
        let raw: Vec<serde_json::Value> = self.call("getUpdates", request, Some(timeout)).await?;
        Ok(decode_updates(raw))
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    #[tracing::instrument(level = "debug", skip_all, fields(chat_id = chat_id))]
    async fn send_message(&self, chat_id: i64, message: OutgoingMessage) -> Result<()> {
        let body = SendMessageBody {
            chat_id,
            text: &message.text,
            parse_mode: message.parse_mode,
            reply_markup: message.reply_markup.as_ref(),
            reply_to_message_id: message.reply_to_message_id,
        };
        let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(chat_id = chat_id, message_id = message_id))]
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        message: OutgoingMessage,
    ) -> Result<()> {
        let body = EditMessageTextBody {
            chat_id,
            message_id,
            text: &message.text,
            parse_mode: message.parse_mode,
            reply_markup: message.reply_markup.as_ref(),
        };
        let _: serde_json::Value = self.call("editMessageText", &body, None).await?;
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<()> {
        let body = AnswerCallbackQueryBody {
            callback_query_id,
            text,
        };
        let _: bool = self.call("answerCallbackQuery", &body, None).await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()> {
        let body = SendChatActionBody { chat_id, action };
        let _: bool = self.call("sendChatAction", &body, None).await?;
        Ok(())
    }
}
