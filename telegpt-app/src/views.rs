//! User-facing texts and inline keyboards.

use crate::store::UserStats;
use telegpt_llm::ModelKind;
use telegpt_telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const GENERIC_ERROR: &str =
    "😔 Sorry, something went wrong while processing your request. Please try again in a few seconds.";

pub const EMPTY_TEXT_HINT: &str = "🤔 Please send a text message.";

pub const VOICE_UNSUPPORTED: &str =
    "🎤 Voice messages are not supported yet.\nPlease send a text message.";

pub const PHOTO_UNSUPPORTED: &str =
    "📸 Images are not supported yet.\nPlease send your question as a text message.";

pub const UNKNOWN_MODEL: &str = "❌ Unknown model!";

pub const SUPPORTED_COMMANDS: [&str; 5] = ["/start", "/help", "/model", "/clear", "/stats"];

pub mod callback {
    pub const SELECT_MODEL: &str = "select_model";
    pub const SELECT_PREFIX: &str = "select_";
    pub const BACK_TO_MAIN: &str = "back_to_main";
    pub const HELP: &str = "help";
}

/// Escape the three characters Telegram's HTML parse mode treats specially.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn model_emoji(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::ChatGpt => "🧠",
        ModelKind::Claude => "🎭",
        ModelKind::DeepSeek => "🚀",
    }
}

fn model_description(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::ChatGpt => "General-purpose assistant from OpenAI",
        ModelKind::Claude => "Advanced model from Anthropic",
        ModelKind::DeepSeek => "Fast and efficient model",
    }
}

fn catalog_lines() -> String {
    ModelKind::ALL
        .iter()
        .map(|kind| {
            format!(
                "• {} {} ({})",
                model_emoji(*kind),
                kind.name(),
                kind.provider().label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Visible characters per outgoing message; the Bot API caps text at 4096.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Model answer as sent back to the chat, split into messages that fit the
/// platform limit. Only the first part carries the model header.
pub fn answer_parts(kind: ModelKind, display_name: &str, text: &str) -> Vec<String> {
    let mut parts: Vec<String> = split_text(text, MAX_MESSAGE_CHARS)
        .into_iter()
        .map(escape_html)
        .collect();
    if let Some(first) = parts.first_mut() {
        *first = format!(
            "{} <b>{}</b>\n\n{}",
            model_emoji(kind),
            escape_html(display_name),
            first
        );
    }
    parts
}

/// Split on char boundaries, preferring the last newline inside each window.
fn split_text(text: &str, max_chars: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max_chars {
        let hard = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(idx, _)| idx);
        let cut = rest[..hard].rfind('\n').filter(|idx| *idx > 0).unwrap_or(hard);
        parts.push(&rest[..cut]);
        rest = rest[cut..].trim_start_matches('\n');
    }
    if !rest.is_empty() || parts.is_empty() {
        parts.push(rest);
    }
    parts
}

pub fn welcome(first_name: &str, current: ModelKind) -> String {
    format!(
        "🤖 Welcome to TeleGPT, {}!\n\n\
         I relay your messages to several language models:\n{}\n\n\
         📋 Commands:\n\
         /start - Show this message\n\
         /model - Choose a model\n\
         /help - Detailed help\n\
         /clear - Clear conversation context\n\
         /stats - Usage statistics\n\n\
         💡 Just send me a message and the selected model will answer!\n\n\
         Current model: {} <b>{}</b>",
        escape_html(first_name),
        catalog_lines(),
        model_emoji(current),
        current.name()
    )
}

pub fn main_menu(first_name: &str) -> String {
    format!(
        "🤖 <b>TeleGPT - Main menu</b>\n\n\
         Hi, {}!\n\n\
         I relay your messages to several language models:\n{}\n\n\
         💡 Send me a message and the selected model will answer!",
        escape_html(first_name),
        catalog_lines()
    )
}

pub fn help() -> String {
    format!(
        "📖 <b>TeleGPT help</b>\n\n\
         <b>🎯 Features:</b>\n\
         • Talk to different models in one chat\n\
         • Conversation context is kept between messages\n\
         • Switch models without losing history\n\n\
         <b>🤖 Models:</b>\n{}\n\n\
         <b>📋 Commands:</b>\n\
         /start - Greeting and main menu\n\
         /model - Choose the active model\n\
         /help - This help\n\
         /clear - Clear the current conversation context\n\
         /stats - Usage statistics\n\n\
         <b>💬 How to use:</b>\n\
         1. Pick a model with /model\n\
         2. Send any message\n\
         3. Get the answer from the selected model\n\
         4. Keep chatting, the context is preserved!\n\n\
         <b>🔧 Support:</b>\n\
         If something goes wrong, use /start to restart.",
        catalog_lines()
    )
}

pub fn short_help() -> &'static str {
    "📖 <b>Quick help</b>\n\n\
     <b>📋 Commands:</b>\n\
     /start - Main menu\n\
     /model - Choose a model\n\
     /help - Detailed help\n\
     /clear - Clear context\n\n\
     <b>💬 Usage:</b>\n\
     1. Pick a model\n\
     2. Send a message\n\
     3. Get the answer\n\n\
     For detailed help use /help"
}

pub fn context_cleared(archived: usize) -> String {
    format!(
        "🧹 <b>Conversation context cleared!</b>\n\n\
         {archived} earlier message(s) will no longer be sent to the model.\n\
         Send any message to start a new conversation!"
    )
}

pub fn model_menu(current: ModelKind) -> String {
    format!(
        "🤖 <b>Choose a model</b>\n\n\
         Current model: {} <b>{}</b>\n\n\
         Pick the model to talk to:",
        model_emoji(current),
        current.name()
    )
}

pub fn model_selected(kind: ModelKind, available: bool) -> String {
    let mut text = format!(
        "✅ <b>Model changed!</b>\n\n\
         {} <b>{}</b>\n\
         📝 {}\n\
         🏢 Provider: {}\n\n\
         Send any message and the selected model will answer!",
        model_emoji(kind),
        kind.name(),
        model_description(kind),
        kind.provider().label()
    );
    if !available {
        text.push_str("\n\n⚠️ This model is not configured right now, so messages will not be answered until it is.");
    }
    text
}

pub fn model_unavailable(current: ModelKind, available: &[ModelKind]) -> String {
    if available.is_empty() {
        return "😔 <b>Unfortunately no model is available right now.</b>\n\n\
                This usually means:\n\
                • API keys are not configured\n\
                • The providers cannot be reached\n\n\
                Please contact the administrator."
            .to_string();
    }
    let names = available
        .iter()
        .map(|kind| kind.name())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "😔 <b>Model {} is unavailable right now.</b>\n\n\
         Available models: {names}\n\n\
         Use /model to pick another one.",
        current.name()
    )
}

pub fn stats(stats: &UserStats) -> String {
    if stats.total_turns == 0 {
        return "📊 <b>Your statistics</b>\n\nNo messages yet. Send one to get started!".to_string();
    }
    let mut text = format!(
        "📊 <b>Your statistics</b>\n\n\
         Messages: {}\n\
         In current context: {}\n",
        stats.total_turns, stats.context_turns
    );
    if let Some(avg) = stats.avg_processing_ms {
        text.push_str(&format!("Average response time: {:.1}s\n", avg / 1000.0));
    }
    text.push_str("\n<b>By model:</b>\n");
    for (key, count) in &stats.per_model {
        let label = match ModelKind::parse(key) {
            Some(kind) => format!("{} {}", model_emoji(kind), kind.name()),
            None => format!("🤖 {}", escape_html(key)),
        };
        text.push_str(&format!("• {label}: {count}\n"));
    }
    text.trim_end().to_string()
}

pub fn unknown_command(name: &str) -> String {
    format!(
        "Unknown command /{}. Supported: {}",
        escape_html(name),
        SUPPORTED_COMMANDS.join(" ")
    )
}

pub fn main_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().row(vec![
        InlineKeyboardButton::callback("🔄 Choose model", callback::SELECT_MODEL),
        InlineKeyboardButton::callback("❓ Help", callback::HELP),
    ])
}

pub fn model_keyboard(current: ModelKind) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();
    for kind in ModelKind::ALL {
        let check = if kind == current { "✅ " } else { "" };
        keyboard = keyboard.row(vec![InlineKeyboardButton::callback(
            format!("{check}{} {}", model_emoji(kind), kind.name()),
            format!("{}{}", callback::SELECT_PREFIX, kind.key()),
        )]);
    }
    keyboard.row(vec![back_button()])
}

pub fn after_selection_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().row(vec![
        InlineKeyboardButton::callback("🔄 Choose another", callback::SELECT_MODEL),
        InlineKeyboardButton::callback("🏠 Main menu", callback::BACK_TO_MAIN),
    ])
}

pub fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().row(vec![back_button()])
}

fn back_button() -> InlineKeyboardButton {
    InlineKeyboardButton::callback("🔙 Back", callback::BACK_TO_MAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escaping_covers_markup_characters() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn answer_is_prefixed_with_model_header() {
        let parts = answer_parts(ModelKind::Claude, "Claude (claude-3)", "<hi>");
        assert_eq!(parts, vec!["🎭 <b>Claude (claude-3)</b>\n\n&lt;hi&gt;".to_string()]);
    }

    #[test]
    fn long_answers_split_on_newlines_within_the_limit() {
        let line = "x".repeat(30);
        let text = vec![line.as_str(); 10].join("\n");
        let parts = split_text(&text, 100);
        assert!(parts.iter().all(|p| p.chars().count() <= 100));
        assert_eq!(parts.concat().len(), text.len() - (parts.len() - 1));
        assert!(parts.iter().all(|p| !p.starts_with('\n')));

        let unbroken = "é".repeat(250);
        let parts = split_text(&unbroken, 100);
        assert_eq!(
            parts.iter().map(|p| p.chars().count()).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(split_text("", 100), vec![""]);
    }

    #[test]
    fn model_keyboard_marks_current_and_ends_with_back() {
        let keyboard = model_keyboard(ModelKind::DeepSeek);
        let rows = &keyboard.inline_keyboard;
        assert_eq!(rows.len(), ModelKind::ALL.len() + 1);
        assert_eq!(rows[0][0].callback_data, "select_chatgpt");
        assert!(rows[2][0].text.starts_with("✅ "));
        assert!(!rows[0][0].text.starts_with("✅ "));
        assert_eq!(rows[3][0].callback_data, callback::BACK_TO_MAIN);
    }

    #[test]
    fn unavailable_notice_lists_alternatives_or_explains_none() {
        let some = model_unavailable(ModelKind::ChatGpt, &[ModelKind::Claude, ModelKind::DeepSeek]);
        assert!(some.contains("Claude, DeepSeek"));
        let none = model_unavailable(ModelKind::ChatGpt, &[]);
        assert!(none.contains("no model is available"));
    }

    #[test]
    fn stats_render_per_model_counts() {
        let rendered = stats(&UserStats {
            total_turns: 3,
            context_turns: 1,
            per_model: vec![("claude".into(), 2), ("chatgpt".into(), 1)],
            avg_processing_ms: Some(1500.0),
            first_turn_at: None,
        });
        assert!(rendered.contains("Messages: 3"));
        assert!(rendered.contains("🎭 Claude: 2"));
        assert!(rendered.contains("1.5s"));
        assert!(stats(&UserStats::default()).contains("No messages yet"));
    }
}
