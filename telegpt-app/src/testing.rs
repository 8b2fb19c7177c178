//! In-process fakes for the platform and model collaborators.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use telegpt_llm::{Backend, LlmError};
use telegpt_telegram::{
    CallbackQuery, Chat, ChatAction, GetUpdates, Message, Messenger, OutgoingMessage,
    TelegramError, Update, UpdateKind, UpdateSource, User,
};
use tokio::time::Instant;

pub fn user(id: i64) -> User {
    User {
        id,
        is_bot: false,
        first_name: format!("user{id}"),
        last_name: None,
        username: Some(format!("u{id}")),
    }
}

pub fn message(user_id: i64, text: Option<&str>) -> Message {
    Message {
        message_id: user_id * 100,
        from: Some(user(user_id)),
        chat: Chat {
            id: user_id,
            kind: "private".to_string(),
        },
        date: 0,
        text: text.map(str::to_string),
        photo: vec![],
        voice: None,
    }
}

pub fn text_update(id: i64, user_id: i64, text: &str) -> Update {
    Update {
        id,
        kind: UpdateKind::Message(message(user_id, Some(text))),
    }
}

pub fn photo_update(id: i64, user_id: i64) -> Update {
    let mut message = message(user_id, None);
    message.photo = vec![serde_json::json!({"file_id": "p"})];
    Update {
        id,
        kind: UpdateKind::Message(message),
    }
}

pub fn callback_update(id: i64, user_id: i64, data: &str) -> Update {
    Update {
        id,
        kind: UpdateKind::CallbackQuery(CallbackQuery {
            id: format!("cb{id}"),
            from: user(user_id),
            message: Some(message(user_id, Some("menu"))),
            data: Some(data.to_string()),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedPoll {
    pub offset: i64,
    pub limit: u32,
    pub timeout: u64,
    pub allowed_updates: Vec<String>,
    pub at: Instant,
}

/// Replays queued responses; answers an empty batch once the script runs out.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<Update>, TelegramError>>>,
    calls: Mutex<Vec<RecordedPoll>>,
}

impl ScriptedSource {
    pub fn push_ok(&self, updates: Vec<Update>) {
        self.script.lock().expect("script lock").push_back(Ok(updates));
    }

    pub fn push_err(&self, error: TelegramError) {
        self.script.lock().expect("script lock").push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedPoll> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn get_updates(&self, request: &GetUpdates) -> telegpt_telegram::Result<Vec<Update>> {
        self.calls.lock().expect("calls lock").push(RecordedPoll {
            offset: request.offset,
            limit: request.limit,
            timeout: request.timeout,
            allowed_updates: request.allowed_updates.clone(),
            at: Instant::now(),
        });
        let next = self.script.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Sent { chat_id: i64, message: OutgoingMessage },
    Edited { chat_id: i64, message_id: i64, message: OutgoingMessage },
    Answered { callback_query_id: String, text: Option<String> },
    Action { chat_id: i64, action: ChatAction },
}

#[derive(Default)]
pub struct RecordingMessenger {
    outbound: Mutex<Vec<Outbound>>,
}

impl RecordingMessenger {
    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().expect("outbound lock").clone()
    }

    /// Text of every sent or edited message, in order.
    pub fn texts(&self) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Sent { message, .. } | Outbound::Edited { message, .. } => {
                    Some(message.text)
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, outbound: Outbound) {
        self.outbound.lock().expect("outbound lock").push(outbound);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        chat_id: i64,
        message: OutgoingMessage,
    ) -> telegpt_telegram::Result<()> {
        self.record(Outbound::Sent { chat_id, message });
        Ok(())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        message: OutgoingMessage,
    ) -> telegpt_telegram::Result<()> {
        self.record(Outbound::Edited {
            chat_id,
            message_id,
            message,
        });
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> telegpt_telegram::Result<()> {
        self.record(Outbound::Answered {
            callback_query_id: callback_query_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn send_chat_action(
        &self,
        chat_id: i64,
        action: ChatAction,
    ) -> telegpt_telegram::Result<()> {
        self.record(Outbound::Action { chat_id, action });
        Ok(())
    }
}

/// Backend that answers after a fixed virtual delay, or fails.
pub struct StubBackend {
    pub name: String,
    pub reply: Result<String, String>,
    pub delay: Duration,
    pub available: bool,
    pub prompts: Mutex<Vec<(String, Option<String>)>>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self {
            name: "Stub (stub-1)".to_string(),
            reply: Ok(reply.to_string()),
            delay: Duration::ZERO,
            available: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            reply: Err(error.to_string()),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<(String, Option<String>)> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn generate_response(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> telegpt_llm::Result<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push((text.to_string(), context.map(str::to_string)));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(LlmError::Http)
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}
