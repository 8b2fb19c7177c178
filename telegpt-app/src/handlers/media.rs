use super::BotContext;
use crate::views;
use anyhow::Result;
use telegpt_telegram::{Message, OutgoingMessage};

pub(super) async fn handle_media(ctx: &BotContext, message: &Message) -> Result<()> {
    let notice = if message.voice.is_some() {
        views::VOICE_UNSUPPORTED
    } else {
        views::PHOTO_UNSUPPORTED
    };
    ctx.messenger
        .send_message(message.chat.id, OutgoingMessage::text(notice))
        .await?;
    Ok(())
}
