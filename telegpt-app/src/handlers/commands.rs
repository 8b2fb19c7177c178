use super::{BotContext, profile_of};
use crate::views;
use anyhow::Result;
use telegpt_llm::ModelKind;
use telegpt_telegram::{Command, Message, OutgoingMessage};

#[tracing::instrument(level = "info", skip_all, fields(command = command.name))]
pub(super) async fn handle_command(
    ctx: &BotContext,
    message: &Message,
    command: Command<'_>,
) -> Result<()> {
    let chat_id = message.chat.id;
    let reply = match command.name.to_ascii_lowercase().as_str() {
        "start" => {
            let Some(from) = message.from.as_ref() else {
                return Ok(());
            };
            let user = ctx.store.get_or_create_user(profile_of(from)).await?;
            tracing::info!(user_id = from.id, "user started the bot");
            OutgoingMessage::html(views::welcome(&from.first_name, ctx.model_for(&user)))
                .with_keyboard(views::main_keyboard())
        }
        "help" => OutgoingMessage::html(views::help()),
        "model" => {
            let Some(from) = message.from.as_ref() else {
                return Ok(());
            };
            let user = ctx.store.get_or_create_user(profile_of(from)).await?;
            if command.args.is_empty() {
                let current = ctx.model_for(&user);
                OutgoingMessage::html(views::model_menu(current))
                    .with_keyboard(views::model_keyboard(current))
            } else {
                match ModelKind::parse(command.args) {
                    Some(kind) => {
                        ctx.store.set_user_model(from.id, kind.key()).await?;
                        tracing::info!(user_id = from.id, model = %kind, "model selected");
                        OutgoingMessage::html(views::model_selected(
                            kind,
                            ctx.backends.is_available(kind),
                        ))
                        .with_keyboard(views::after_selection_keyboard())
                    }
                    None => {
                        let current = ctx.model_for(&user);
                        OutgoingMessage::text(views::UNKNOWN_MODEL)
                            .with_keyboard(views::model_keyboard(current))
                    }
                }
            }
        }
        "clear" => {
            let Some(from) = message.from.as_ref() else {
                return Ok(());
            };
            let user = ctx.store.get_or_create_user(profile_of(from)).await?;
            let archived = ctx.store.clear_context(user.id).await?;
            tracing::info!(user_id = from.id, archived, "conversation context cleared");
            OutgoingMessage::html(views::context_cleared(archived))
        }
        "stats" => {
            let Some(from) = message.from.as_ref() else {
                return Ok(());
            };
            let user = ctx.store.get_or_create_user(profile_of(from)).await?;
            let stats = ctx.store.user_stats(user.id).await?;
            OutgoingMessage::html(views::stats(&stats))
        }
        other => {
            tracing::debug!(command = other, "unknown command");
            OutgoingMessage::html(views::unknown_command(other))
        }
    };
    ctx.messenger.send_message(chat_id, reply).await?;
    Ok(())
}
