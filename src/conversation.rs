//! Dialogue driver: windowed history in, one persisted turn out.
//!
//! Text messages are answered with the user's recent history as context and
//! the new turn is stored atomically. Photos and voice notes are one-shot:
//! the file is uploaded, answered and deleted locally, without touching history.

use crate::config::{
    Settings, HISTORY_RETENTION_CAP, PHOTO_DEFAULT_PROMPT, PHOTO_MIME_TYPE, VOICE_MIME_TYPE,
    VOICE_PROMPT,
};
use crate::llm::{ChatTurn, GenerativeBackend, LlmError};
use crate::media;
use crate::storage::{StorageError, StorageProvider};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Reply sent when a text message could not be answered
pub const TEXT_ERROR_REPLY: &str = "Произошла ошибка при обработке сообщения.";
/// Reply sent when a photo could not be answered
pub const PHOTO_ERROR_REPLY: &str = "Произошла ошибка при обработке фото.";
/// Reply sent when a voice message could not be answered
pub const VOICE_ERROR_REPLY: &str = "Произошла ошибка при обработке голосового сообщения.";

/// Failure inside a dialogue step
#[derive(Debug, Error)]
pub enum ConversationError {
    /// Persisting or reading history failed
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    /// The generative backend failed
    #[error("backend failure: {0}")]
    Backend(#[from] LlmError),
}

/// Drives conversations between users and the generative backend
pub struct ConversationDriver {
    storage: Arc<dyn StorageProvider>,
    backend: Arc<dyn GenerativeBackend>,
    chat_model: String,
    media_model: String,
    retention_cap: usize,
}

impl ConversationDriver {
    /// Create a driver using the given models
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        backend: Arc<dyn GenerativeBackend>,
        chat_model: impl Into<String>,
        media_model: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            backend,
            chat_model: chat_model.into(),
            media_model: media_model.into(),
            retention_cap: HISTORY_RETENTION_CAP,
        }
    }

    /// Create a driver with the models named in settings
    #[must_use]
    pub fn from_settings(
        settings: &Settings,
        storage: Arc<dyn StorageProvider>,
        backend: Arc<dyn GenerativeBackend>,
    ) -> Self {
        Self::new(
            storage,
            backend,
            settings.chat_model.clone(),
            settings.media_model.clone(),
        )
    }

    /// Maximum number of stored messages per user
    #[must_use]
    pub const fn retention_cap(&self) -> usize {
        self.retention_cap
    }

    /// Answer a text message. Never fails: errors become [`TEXT_ERROR_REPLY`].
    pub async fn process_text(&self, user_id: i64, text: &str) -> String {
        match self.try_process_text(user_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Failed to process text from user {user_id}: {e}");
                TEXT_ERROR_REPLY.to_string()
            }
        }
    }

    /// Answer a text message, surfacing the failing step.
    ///
    /// # Errors
    ///
    /// Returns `ConversationError::Storage` or `ConversationError::Backend`.
    pub async fn try_process_text(
        &self,
        user_id: i64,
        text: &str,
    ) -> Result<String, ConversationError> {
        if self.storage.ensure_user(user_id).await? {
            info!("User {user_id} not found, created a new record.");
        }

        // Trim happens inside the same read, before the context is built
        let window = self
            .storage
            .load_history_window(user_id, self.retention_cap)
            .await?;
        if window.trimmed > 0 {
            info!(
                "Deleted {} oldest messages of user {user_id} beyond the cap of {}",
                window.trimmed, self.retention_cap
            );
        }

        let context: Vec<ChatTurn> = window
            .messages
            .into_iter()
            .map(|m| ChatTurn {
                role: m.role.into(),
                text: m.content,
            })
            .collect();

        let reply = self
            .backend
            .chat(&context, text, &self.chat_model)
            .await?;

        self.storage
            .append_turn(user_id, text.to_string(), reply.clone())
            .await?;

        Ok(reply)
    }

    /// Answer a downloaded photo, using the caption as the prompt when present.
    ///
    /// The local file is deleted afterwards whatever the outcome.
    pub async fn process_photo(&self, path: &Path, caption: Option<&str>) -> String {
        let prompt = caption
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(PHOTO_DEFAULT_PROMPT);
        let result = self.answer_about_file(path, PHOTO_MIME_TYPE, prompt).await;
        media::remove_download(path).await;

        result.unwrap_or_else(|e| {
            error!("Failed to process photo {}: {e}", path.display());
            PHOTO_ERROR_REPLY.to_string()
        })
    }

    /// Answer a downloaded voice message. The local file is deleted afterwards.
    pub async fn process_voice(&self, path: &Path) -> String {
        let result = self
            .answer_about_file(path, VOICE_MIME_TYPE, VOICE_PROMPT)
            .await;
        media::remove_download(path).await;

        result.unwrap_or_else(|e| {
            error!("Failed to process voice {}: {e}", path.display());
            VOICE_ERROR_REPLY.to_string()
        })
    }

    async fn answer_about_file(
        &self,
        path: &Path,
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, ConversationError> {
        let file = self.backend.upload_file(path, mime_type).await?;
        let reply = self
            .backend
            .generate_with_file(&file, prompt, &self.media_model)
            .await?;
        Ok(reply)
    }
}
