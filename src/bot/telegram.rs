//! Telegram update parsing and command registration

use crate::media::PhotoRef;
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, PhotoSize};
use teloxide::utils::command::BotCommands;

/// Commands the bot understands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    /// Greeting
    #[command(description = "Начать работу с ботом.")]
    Start,
    /// Admin panel
    #[command(description = "Панель администратора.")]
    Admin,
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Chat a callback query should be answered in.
///
/// Falls back to the private chat with the sender when the originating
/// message is unavailable.
#[must_use]
pub fn callback_chat_id(q: &CallbackQuery) -> ChatId {
    q.message
        .as_ref()
        .map_or(ChatId(q.from.id.0.cast_signed()), |m| m.chat().id)
}

/// Sizes of a photo message in transport-neutral form
#[must_use]
pub fn photo_refs(sizes: &[PhotoSize]) -> Vec<PhotoRef> {
    sizes
        .iter()
        .map(|p| PhotoRef {
            file_id: p.file.id.0.clone(),
            width: p.width,
            height: p.height,
            file_size: p.file.size,
        })
        .collect()
}

/// Register `/start` and `/admin` in the Telegram client menu
///
/// # Errors
///
/// Returns an error if Telegram rejects the request.
pub async fn register_commands(bot: &Bot) -> Result<()> {
    bot.set_my_commands(Command::bot_commands()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_parse_lowercase() {
        assert_eq!(Command::parse("/start", "bot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/admin", "bot").ok(), Some(Command::Admin));
        assert!(Command::parse("/stats", "bot").is_err());
    }

    #[test]
    fn test_both_commands_are_registered() {
        let names: Vec<String> = Command::bot_commands()
            .into_iter()
            .map(|c| c.command.trim_start_matches('/').to_string())
            .collect();
        assert_eq!(names, vec!["start", "admin"]);
    }
}
