//! Outbound side of a chat: what handlers may do to reply.

use crate::bot::telegram::callback_chat_id;
use crate::bot::views::{admin_panel_keyboard, ADMIN_PANEL};
use crate::utils::retry_telegram_operation;
use anyhow::Result;
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatAction, ChatId, FileId, ParseMode};

/// How a text reply should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Sent as-is
    Plain,
    /// Parsed by Telegram as MarkdownV2
    MarkdownV2,
}

/// Reply channel bound to one chat (and, for callbacks, one callback query)
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message
    async fn send_text(&self, text: &str, format: TextFormat) -> Result<()>;

    /// Send the admin panel with its inline keyboard
    async fn send_admin_panel(&self) -> Result<()>;

    /// Acknowledge the callback query, optionally with a notification text
    async fn answer_callback(&self, text: Option<&str>) -> Result<()>;

    /// Show the "typing" indicator
    async fn send_typing(&self) -> Result<()>;

    /// Download a file by its transport file id
    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// [`ChatTransport`] over the Telegram Bot API
pub struct TelegramTransport {
    bot: Bot,
    chat_id: ChatId,
    callback: Option<CallbackQuery>,
}

impl TelegramTransport {
    /// Transport replying into a chat
    pub const fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self {
            bot,
            chat_id,
            callback: None,
        }
    }

    /// Transport answering a callback query and replying in its chat
    #[must_use]
    pub fn for_callback(bot: Bot, query: &CallbackQuery) -> Self {
        Self {
            bot,
            chat_id: callback_chat_id(query),
            callback: Some(query.clone()),
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, text: &str, format: TextFormat) -> Result<()> {
        let request = self.bot.send_message(self.chat_id, text);
        match format {
            TextFormat::Plain => request.await?,
            TextFormat::MarkdownV2 => request.parse_mode(ParseMode::MarkdownV2).await?,
        };
        Ok(())
    }

    async fn send_admin_panel(&self) -> Result<()> {
        self.bot
            .send_message(self.chat_id, ADMIN_PANEL)
            .reply_markup(admin_panel_keyboard())
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, text: Option<&str>) -> Result<()> {
        let Some(query) = &self.callback else {
            return Ok(());
        };
        let request = self.bot.answer_callback_query(query.id.clone());
        match text {
            Some(text) => request.text(text).await?,
            None => request.await?,
        };
        Ok(())
    }

    async fn send_typing(&self) -> Result<()> {
        self.bot
            .send_chat_action(self.chat_id, ChatAction::Typing)
            .await?;
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file_id = FileId(file_id.to_string());
        retry_telegram_operation(|| async {
            let file = self.bot.get_file(file_id.clone()).await?;
            let mut buf = Vec::new();
            self.bot.download_file(&file.path, &mut buf).await?;
            Ok(buf)
        })
        .await
    }
}
