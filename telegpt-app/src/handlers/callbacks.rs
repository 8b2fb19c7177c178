use super::{BotContext, profile_of};
use crate::views::{self, callback};
use anyhow::Result;
use telegpt_llm::ModelKind;
use telegpt_telegram::{CallbackQuery, OutgoingMessage};

/// Inline-keyboard presses. The query is always answered so the client stops
/// showing its spinner, even when the payload is ignored.
#[tracing::instrument(level = "info", skip_all, fields(user_id = query.from.id))]
pub(super) async fn handle_callback(ctx: &BotContext, query: &CallbackQuery) -> Result<()> {
    if let Err(error) = ctx.messenger.answer_callback_query(&query.id, None).await {
        tracing::warn!(%error, "answer_callback_query failed");
    }

    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let Some(menu) = query.message.as_ref() else {
        tracing::debug!(data, "callback without a message to edit");
        return Ok(());
    };

    let user = &query.from;
    let edit = match data {
        callback::SELECT_MODEL => {
            let current = ctx.current_model(user.id).await?;
            OutgoingMessage::html(views::model_menu(current))
                .with_keyboard(views::model_keyboard(current))
        }
        callback::BACK_TO_MAIN => OutgoingMessage::html(views::main_menu(&user.first_name))
            .with_keyboard(views::main_keyboard()),
        callback::HELP => {
            OutgoingMessage::html(views::short_help()).with_keyboard(views::back_keyboard())
        }
        other => match other.strip_prefix(callback::SELECT_PREFIX) {
            Some(key) => match ModelKind::parse(key) {
                Some(kind) => {
                    if !ctx.store.set_user_model(user.id, kind.key()).await? {
                        ctx.store.get_or_create_user(profile_of(user)).await?;
                        ctx.store.set_user_model(user.id, kind.key()).await?;
                    }
                    tracing::info!(model = %kind, "model selected");
                    OutgoingMessage::html(views::model_selected(
                        kind,
                        ctx.backends.is_available(kind),
                    ))
                    .with_keyboard(views::after_selection_keyboard())
                }
                None => OutgoingMessage::text(views::UNKNOWN_MODEL),
            },
            None => {
                tracing::debug!(data = other, "ignoring unknown callback payload");
                return Ok(());
            }
        },
    };

    match ctx
        .messenger
        .edit_message_text(menu.chat.id, menu.message_id, edit)
        .await
    {
        Err(error) if error.is_message_not_modified() => Ok(()),
        other => other.map_err(Into::into),
    }
}
