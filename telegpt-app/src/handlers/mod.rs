//! Per-update handlers and the router the processing loop calls into.

mod callbacks;
mod chat;
mod commands;
mod media;

use crate::store::{ConversationStore, UserProfile, UserRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use telegpt_llm::{BackendRegistry, ModelKind};
use telegpt_telegram::{CallbackQuery, Command, Message, Messenger, Update, UpdateKind, User};

/// Seam between the processing loop and whatever reacts to an update.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: Update) -> Result<()>;
}

/// Which handler an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route<'a> {
    Text(&'a Message),
    Command(&'a Message, Command<'a>),
    Callback(&'a CallbackQuery),
    Media(&'a Message),
}

impl<'a> Route<'a> {
    pub fn of(update: &'a Update) -> Option<Self> {
        match &update.kind {
            UpdateKind::CallbackQuery(query) => Some(Route::Callback(query)),
            UpdateKind::Message(message) => {
                if let Some(command) = message.command() {
                    Some(Route::Command(message, command))
                } else if message.is_plain_text() {
                    Some(Route::Text(message))
                } else if message.has_media() {
                    Some(Route::Media(message))
                } else {
                    None
                }
            }
            UpdateKind::Unsupported => None,
        }
    }
}

/// Shared collaborators every handler gets.
pub struct BotContext {
    pub store: Arc<dyn ConversationStore>,
    pub backends: Arc<BackendRegistry>,
    pub messenger: Arc<dyn Messenger>,
    pub context_turns: usize,
}

impl BotContext {
    /// The user's stored model, falling back to the registry default when the
    /// stored key is not in the catalog.
    fn model_for(&self, user: &UserRecord) -> ModelKind {
        ModelKind::parse(&user.current_model).unwrap_or_else(|| self.backends.default_model())
    }

    async fn current_model(&self, telegram_id: i64) -> Result<ModelKind> {
        let stored = self.store.get_user_model(telegram_id).await?;
        Ok(stored
            .as_deref()
            .and_then(ModelKind::parse)
            .unwrap_or_else(|| self.backends.default_model()))
    }
}

fn profile_of(user: &User) -> UserProfile {
    UserProfile {
        telegram_id: user.id,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
        last_name: user.last_name.clone(),
    }
}

pub struct HandlerRouter {
    ctx: BotContext,
}

impl HandlerRouter {
    pub fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl UpdateHandler for HandlerRouter {
    #[tracing::instrument(level = "debug", skip_all, fields(update_id = update.id))]
    async fn handle(&self, update: Update) -> Result<()> {
        match Route::of(&update) {
            Some(Route::Text(message)) => chat::handle_text(&self.ctx, message).await,
            Some(Route::Command(message, command)) => {
                commands::handle_command(&self.ctx, message, command).await
            }
            Some(Route::Callback(query)) => callbacks::handle_callback(&self.ctx, query).await,
            Some(Route::Media(message)) => media::handle_media(&self.ctx, message).await,
            None => {
                tracing::debug!("no handler for update");
                Ok(())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::harness;
    use super::*;
    use crate::testing::{callback_update, message, photo_update, text_update};

    #[test]
    fn routes_by_update_shape() {
        let text = text_update(1, 7, "hello");
        assert!(matches!(Route::of(&text), Some(Route::Text(_))));

        let command = text_update(2, 7, "/model claude");
        match Route::of(&command) {
            Some(Route::Command(_, cmd)) => {
                assert_eq!(cmd.name, "model");
                assert_eq!(cmd.args, "claude");
            }
            other => panic!("unexpected route: {other:?}"),
        }

        let callback = callback_update(3, 7, "help");
        assert!(matches!(Route::of(&callback), Some(Route::Callback(_))));

        let photo = photo_update(4, 7);
        assert!(matches!(Route::of(&photo), Some(Route::Media(_))));

        let sticker = Update {
            id: 5,
            kind: UpdateKind::Message(message(7, None)),
        };
        assert_eq!(Route::of(&sticker), None);
        let unsupported = Update {
            id: 6,
            kind: UpdateKind::Unsupported,
        };
        assert_eq!(Route::of(&unsupported), None);
    }

    #[tokio::test]
    async fn updates_without_a_route_are_ignored() {
        let h = harness(vec![]);
        let sticker = Update {
            id: 5,
            kind: UpdateKind::Message(message(7, None)),
        };
        h.router.handle(sticker).await.expect("ignored");
        assert!(h.messenger.outbound().is_empty());
    }
}
