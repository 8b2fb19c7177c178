//! Telegram Bot API plumbing for TeleGPT.
//!
//! The client is pure I/O: it turns `getUpdates` payloads into [`Update`]s and
//! sends outbound messages. Scheduling lives in the application crate.

mod client;
mod error;
mod traits;
mod types;

pub use client::{DEFAULT_API_BASE_URL, TelegramClient};
pub use error::{Result, TelegramError};
pub use traits::{Messenger, UpdateSource};
pub use types::{
    ALLOWED_UPDATES, CallbackQuery, Chat, ChatAction, Command, GetUpdates, InlineKeyboardButton,
    InlineKeyboardMarkup, Message, OutgoingMessage, ParseMode, Update, UpdateKind, User,
};
