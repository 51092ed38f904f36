//! Sending replies that may exceed Telegram's message size.

use crate::bot::transport::{ChatTransport, TextFormat};
use crate::config::TELEGRAM_MESSAGE_LIMIT;
use crate::conversation::TEXT_ERROR_REPLY;
use crate::utils;
use anyhow::Result;
use tracing::warn;

/// Sends a long message by splitting it into multiple parts.
///
/// Each part of at most [`TELEGRAM_MESSAGE_LIMIT`] characters is sent as
/// MarkdownV2 first; if Telegram rejects the markup, the same part is resent
/// as plain text. A blank `text` is replaced by the generic error reply,
/// since Telegram rejects empty messages.
///
/// # Errors
///
/// Returns an error if a part cannot be sent even as plain text.
pub async fn send_long_message(transport: &dyn ChatTransport, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        warn!("Reply is empty, sending the error text instead");
        return transport.send_text(TEXT_ERROR_REPLY, TextFormat::Plain).await;
    }
    for part in utils::split_message_chunks(text, TELEGRAM_MESSAGE_LIMIT) {
        if let Err(e) = transport.send_text(&part, TextFormat::MarkdownV2).await {
            warn!("MarkdownV2 send failed, retrying as plain text: {e}");
            transport.send_text(&part, TextFormat::Plain).await?;
        }
    }
    Ok(())
}
