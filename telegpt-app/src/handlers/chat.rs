use super::{BotContext, profile_of};
use crate::store::{NewTurn, Turn};
use crate::views;
use anyhow::{Context, Result};
use telegpt_telegram::{ChatAction, Message, OutgoingMessage};
use tokio::time::Instant;

/// Plain text: ask the user's model, remember the turn, reply.
#[tracing::instrument(level = "info", skip_all, fields(chat_id = message.chat.id))]
pub(super) async fn handle_text(ctx: &BotContext, message: &Message) -> Result<()> {
    let Some(from) = message.from.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let text = message.text.as_deref().unwrap_or_default().trim();
    if text.is_empty() {
        ctx.messenger
            .send_message(chat_id, OutgoingMessage::text(views::EMPTY_TEXT_HINT))
            .await?;
        return Ok(());
    }

    let started = Instant::now();
    let user = ctx.store.get_or_create_user(profile_of(from)).await?;
    let model = ctx.model_for(&user);
    let Some(backend) = ctx.backends.get(model) else {
        tracing::warn!(user_id = from.id, %model, "selected model unavailable");
        let notice = views::model_unavailable(model, &ctx.backends.available());
        ctx.messenger
            .send_message(chat_id, OutgoingMessage::html(notice))
            .await?;
        return Ok(());
    };

    if let Err(error) = ctx.messenger.send_chat_action(chat_id, ChatAction::Typing).await {
        tracing::debug!(%error, "typing indicator failed");
    }

    let turns = ctx
        .store
        .get_recent_turns(user.id, ctx.context_turns)
        .await?;
    let context = format_context(&turns);
    let display_name = backend.display_name();
    let answer = backend
        .generate_response(text, context.as_deref())
        .await
        .with_context(|| format!("{display_name} failed to answer"))?;
    let elapsed = started.elapsed();

    ctx.store
        .record_turn(NewTurn {
            user_id: user.id,
            user_message: text.to_string(),
            ai_response: answer.clone(),
            model: model.key().to_string(),
            telegram_message_id: Some(message.message_id),
            processing_time: elapsed,
        })
        .await?;

    for (idx, part) in views::answer_parts(model, &display_name, &answer)
        .into_iter()
        .enumerate()
    {
        let mut outgoing = OutgoingMessage::html(part);
        if idx == 0 {
            outgoing = outgoing.reply_to(message.message_id);
        }
        ctx.messenger.send_message(chat_id, outgoing).await?;
    }

    tracing::info!(
        user_id = from.id,
        %model,
        context_turns = turns.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "answer sent"
    );
    Ok(())
}

/// Prior turns as alternating `User:` / `Assistant:` paragraphs.
fn format_context(turns: &[Turn]) -> Option<String> {
    if turns.is_empty() {
        return None;
    }
    let paragraphs: Vec<String> = turns
        .iter()
        .flat_map(|turn| {
            [
                format!("User: {}", turn.user_message),
                format!("Assistant: {}", turn.ai_response),
            ]
        })
        .collect();
    Some(paragraphs.join("\n\n"))
}
