use serde::{Deserialize, Serialize};

/// Update types the bot subscribes to.
pub const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

/// Parameters of one `getUpdates` long-poll call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetUpdates {
    pub offset: i64,
    pub limit: u32,
    /// Server-side long-poll wait, whole seconds.
    pub timeout: u64,
    pub allowed_updates: Vec<String>,
}

impl GetUpdates {
    pub fn new(offset: i64, limit: u32, timeout: u64) -> Self {
        Self {
            offset,
            limit,
            timeout,
            allowed_updates: ALLOWED_UPDATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: i64,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Message(Message),
    CallbackQuery(CallbackQuery),
    /// An update whose shape the bot does not handle. Its id still counts
    /// toward the poll cursor.
    Unsupported,
}

impl Update {
    /// Originating user, if the update carries one.
    pub fn user_id(&self) -> Option<i64> {
        match &self.kind {
            UpdateKind::Message(message) => message.from.as_ref().map(|user| user.id),
            UpdateKind::CallbackQuery(query) => Some(query.from.id),
            UpdateKind::Unsupported => None,
        }
    }

    /// Chat a reply should go to.
    pub fn chat_id(&self) -> Option<i64> {
        match &self.kind {
            UpdateKind::Message(message) => Some(message.chat.id),
            UpdateKind::CallbackQuery(query) => query
                .message
                .as_ref()
                .map(|message| message.chat.id)
                .or(Some(query.from.id)),
            UpdateKind::Unsupported => None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Plain (non-command) text from a known user: the kind of update that
    /// justifies fast polling.
    pub fn is_user_text(&self) -> bool {
        self.message()
            .is_some_and(|message| message.from.is_some() && message.is_plain_text())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Vec<serde_json::Value>,
    #[serde(default)]
    pub voice: Option<serde_json::Value>,
}

/// A `/command` split into its name and argument tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a str,
    pub args: &'a str,
}

impl Message {
    pub fn is_command(&self) -> bool {
        self.text
            .as_deref()
            .is_some_and(|text| text.trim_start().starts_with('/'))
    }

    pub fn is_plain_text(&self) -> bool {
        self.text.is_some() && !self.is_command()
    }

    pub fn has_media(&self) -> bool {
        !self.photo.is_empty() || self.voice.is_some()
    }

    /// Parses `/name@bot args` into `name` and `args`.
    pub fn command(&self) -> Option<Command<'_>> {
        let text = self.text.as_deref()?.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest
            .split_once(char::is_whitespace)
            .map(|(head, args)| (head, args.trim()))
            .unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        Some(Command { name, args })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

impl From<RawUpdate> for Update {
    fn from(raw: RawUpdate) -> Self {
        let kind = if let Some(message) = raw.message {
            UpdateKind::Message(message)
        } else if let Some(query) = raw.callback_query {
            UpdateKind::CallbackQuery(query)
        } else {
            UpdateKind::Unsupported
        };
        Update {
            id: raw.update_id,
            kind,
        }
    }
}

/// Decode each element independently so one malformed update cannot poison
/// the whole batch.
pub(crate) fn decode_updates(values: Vec<serde_json::Value>) -> Vec<Update> {
    let mut updates = Vec::with_capacity(values.len());
    for value in values {
        let update_id = value.get("update_id").and_then(serde_json::Value::as_i64);
        match serde_json::from_value::<RawUpdate>(value) {
            Ok(raw) => updates.push(raw.into()),
            Err(error) => match update_id {
                Some(id) => {
                    tracing::warn!(update_id = id, %error, "unrecognized update payload");
                    updates.push(Update {
                        id,
                        kind: UpdateKind::Unsupported,
                    });
                }
                None => {
                    tracing::warn!(%error, "dropping update without update_id");
                }
            },
        }
    }
    updates.sort_by_key(|update| update.id);
    updates
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    Typing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    pub fn row(mut self, buttons: Vec<InlineKeyboardButton>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub reply_markup: Option<InlineKeyboardMarkup>,
    pub reply_to_message_id: Option<i64>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            reply_markup: None,
            reply_to_message_id: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            ..Self::text(text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.reply_markup = Some(keyboard);
        self
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(text: Option<&str>) -> Message {
        Message {
            message_id: 1,
            from: Some(User {
                id: 42,
                is_bot: false,
                first_name: "Ann".to_string(),
                last_name: None,
                username: None,
            }),
            chat: Chat {
                id: 42,
                kind: "private".to_string(),
            },
            date: 0,
            text: text.map(str::to_string),
            photo: vec![],
            voice: None,
        }
    }

    #[test]
    fn command_parsing_strips_bot_mention_and_splits_args() {
        let m = message(Some("/model@telegpt_bot  claude "));
        let cmd = m.command().expect("command");
        assert_eq!(cmd.name, "model");
        assert_eq!(cmd.args, "claude");
        assert!(m.is_command());
        assert!(!m.is_plain_text());

        assert_eq!(message(Some("/start")).command().map(|c| c.name), Some("start"));
        assert!(message(Some("/")).command().is_none());
        assert!(message(Some("hello /start")).command().is_none());
    }

    #[test]
    fn user_text_requires_sender_and_non_command() {
        let text = Update {
            id: 1,
            kind: UpdateKind::Message(message(Some("hi"))),
        };
        assert!(text.is_user_text());
        assert_eq!(text.user_id(), Some(42));

        let cmd = Update {
            id: 2,
            kind: UpdateKind::Message(message(Some("/help"))),
        };
        assert!(!cmd.is_user_text());

        let mut anonymous = message(Some("hi"));
        anonymous.from = None;
        let channel_post = Update {
            id: 3,
            kind: UpdateKind::Message(anonymous),
        };
        assert!(!channel_post.is_user_text());
        assert_eq!(channel_post.user_id(), None);
        assert_eq!(channel_post.chat_id(), Some(42));
    }

    #[test]
    fn decode_keeps_unknown_shapes_with_ids_and_drops_idless_entries() {
        let updates = decode_updates(vec![
            json!({"update_id": 12, "edited_message": {"message_id": 3}}),
            json!({"update_id": 10, "message": {
                "message_id": 5,
                "from": {"id": 7, "first_name": "Bo"},
                "chat": {"id": 7, "type": "private"},
                "text": "hello"
            }}),
            json!({"update_id": 11, "message": {"message_id": "not-a-number"}}),
            json!({"message": {"message_id": 1}}),
            json!({"update_id": 13, "callback_query": {
                "id": "cb1",
                "from": {"id": 7, "first_name": "Bo"},
                "data": "select_claude"
            }}),
        ]);

        let ids: Vec<i64> = updates.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![10, 11, 12, 13]);
        assert!(updates[0].is_user_text());
        assert_eq!(updates[1].kind, UpdateKind::Unsupported);
        assert_eq!(updates[2].kind, UpdateKind::Unsupported);
        assert_eq!(updates[3].user_id(), Some(7));
        assert_eq!(updates[3].chat_id(), Some(7));
    }

    #[test]
    fn media_detection() {
        let mut m = message(None);
        assert!(!m.has_media());
        m.voice = Some(json!({"file_id": "v"}));
        assert!(m.has_media());
        assert!(!m.is_plain_text());
    }

    #[test]
    fn outgoing_html_keyboard_serializes_like_bot_api() {
        let keyboard = InlineKeyboardMarkup::default()
            .row(vec![InlineKeyboardButton::callback("Help", "help")]);
        let json = serde_json::to_value(&keyboard).expect("serialize");
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "help");
        assert_eq!(
            serde_json::to_value(ParseMode::Html).expect("serialize"),
            json!("HTML")
        );
        assert_eq!(
            serde_json::to_value(ChatAction::Typing).expect("serialize"),
            json!("typing")
        );
        let msg = OutgoingMessage::html("<b>x</b>").reply_to(9);
        assert_eq!(msg.parse_mode, Some(ParseMode::Html));
        assert_eq!(msg.reply_to_message_id, Some(9));
    }
}
