//! Event handlers, independent of the Telegram wiring.
//!
//! Every handler checks access before doing any state or backend work. Text
//! from an admin with a pending action is consumed by the admin state table
//! and never reaches the backend.

use crate::access::AccessRegistry;
use crate::bot::admin_state::{AdminAction, AdminInputOutcome, AdminStateTable};
use crate::bot::messaging::send_long_message;
use crate::bot::transport::{ChatTransport, TextFormat};
use crate::bot::views;
use crate::conversation::{
    ConversationDriver, PHOTO_ERROR_REPLY, TEXT_ERROR_REPLY, VOICE_ERROR_REPLY,
};
use crate::media::{self, PhotoRef};
use crate::utils::truncate_str;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Dispatch target for inbound chat events
pub struct Router {
    registry: Arc<AccessRegistry>,
    admin_state: Arc<AdminStateTable>,
    driver: Arc<ConversationDriver>,
    downloads_dir: PathBuf,
}

impl Router {
    /// Create a router
    #[must_use]
    pub fn new(
        registry: Arc<AccessRegistry>,
        admin_state: Arc<AdminStateTable>,
        driver: Arc<ConversationDriver>,
        downloads_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            admin_state,
            driver,
            downloads_dir,
        }
    }

    /// Pending admin actions
    #[must_use]
    pub fn admin_state(&self) -> &AdminStateTable {
        &self.admin_state
    }

    /// Directory downloaded media is written to
    #[must_use]
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Returns whether the user is allowed. Otherwise replies with the denial
    /// text, or with `failure_reply` if the allow-list could not be read.
    async fn ensure_allowed(
        &self,
        transport: &dyn ChatTransport,
        user_id: i64,
        failure_reply: &str,
    ) -> Result<bool> {
        let reply = match self.registry.is_allowed(user_id).await {
            Ok(true) => return Ok(true),
            Ok(false) => {
                info!("Access denied for user {user_id}");
                views::ACCESS_DENIED
            }
            Err(e) => {
                error!("Access check failed for user {user_id}: {e}");
                failure_reply
            }
        };
        transport.send_text(reply, TextFormat::Plain).await?;
        Ok(false)
    }

    /// `/start`
    ///
    /// # Errors
    ///
    /// Returns an error if the reply cannot be sent.
    pub async fn on_start(&self, transport: &dyn ChatTransport, user_id: i64) -> Result<()> {
        if self
            .ensure_allowed(transport, user_id, TEXT_ERROR_REPLY)
            .await?
        {
            transport
                .send_text(views::GREETING, TextFormat::Plain)
                .await?;
        }
        Ok(())
    }

    /// `/admin`
    ///
    /// # Errors
    ///
    /// Returns an error if the reply cannot be sent.
    pub async fn on_admin_command(
        &self,
        transport: &dyn ChatTransport,
        user_id: i64,
    ) -> Result<()> {
        if !self.registry.is_admin(user_id) {
            info!("User {user_id} requested the admin panel without rights");
            transport
                .send_text(views::NOT_ADMIN, TextFormat::Plain)
                .await?;
            return Ok(());
        }
        transport.send_admin_panel().await
    }

    /// Inline keyboard button press
    ///
    /// # Errors
    ///
    /// Returns an error if a reply cannot be sent.
    pub async fn on_callback(
        &self,
        transport: &dyn ChatTransport,
        user_id: i64,
        data: &str,
    ) -> Result<()> {
        if !self.registry.is_admin(user_id) {
            transport.answer_callback(Some(views::NOT_ADMIN)).await?;
            return Ok(());
        }

        match data {
            views::CALLBACK_LIST_USERS => {
                let users = self.registry.get_allowed_users().await?;
                transport.answer_callback(None).await?;
                transport
                    .send_text(&views::allowed_users_list(&users), TextFormat::Plain)
                    .await?;
            }
            views::CALLBACK_ADD_USER => {
                self.admin_state.select(user_id, AdminAction::AddUser).await;
                transport.answer_callback(None).await?;
                transport
                    .send_text(views::ASK_ADD_ID, TextFormat::Plain)
                    .await?;
            }
            views::CALLBACK_REMOVE_USER => {
                self.admin_state
                    .select(user_id, AdminAction::RemoveUser)
                    .await;
                transport.answer_callback(None).await?;
                transport
                    .send_text(views::ASK_REMOVE_ID, TextFormat::Plain)
                    .await?;
            }
            other => {
                warn!("Unknown callback data from admin {user_id}: {other}");
                transport.answer_callback(None).await?;
            }
        }
        Ok(())
    }

    /// Plain text message
    ///
    /// # Errors
    ///
    /// Returns an error if a reply cannot be sent.
    pub async fn on_text(
        &self,
        transport: &dyn ChatTransport,
        user_id: i64,
        text: &str,
    ) -> Result<()> {
        if self.registry.is_admin(user_id)
            && self.handle_admin_input(transport, user_id, text).await?
        {
            return Ok(());
        }

        if !self
            .ensure_allowed(transport, user_id, TEXT_ERROR_REPLY)
            .await?
        {
            return Ok(());
        }

        info!("Text from user {user_id}: {}", truncate_str(text, 100));
        transport
            .send_text(views::WAIT_TEXT, TextFormat::Plain)
            .await?;
        typing(transport).await;

        let reply = self.driver.process_text(user_id, text).await;
        send_long_message(transport, &reply).await
    }

    /// Returns `true` if the text was consumed by a pending admin action.
    async fn handle_admin_input(
        &self,
        transport: &dyn ChatTransport,
        admin_id: i64,
        text: &str,
    ) -> Result<bool> {
        let outcome = match self
            .admin_state
            .handle_input(&self.registry, admin_id, text)
            .await
        {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Ok(false),
            Err(e) => {
                error!("Admin {admin_id} action failed: {e}");
                transport
                    .send_text(TEXT_ERROR_REPLY, TextFormat::Plain)
                    .await?;
                return Ok(true);
            }
        };

        let reply = match outcome {
            AdminInputOutcome::InvalidId => views::INVALID_ID.to_string(),
            AdminInputOutcome::Added(id) => views::user_added(id),
            AdminInputOutcome::Removed(id) => views::user_removed(id),
            AdminInputOutcome::NotFound(id) => views::user_not_found(id),
        };
        transport.send_text(&reply, TextFormat::Plain).await?;
        Ok(true)
    }

    /// Photo message; `photos` are the sizes Telegram offers for it
    ///
    /// # Errors
    ///
    /// Returns an error if a reply cannot be sent.
    pub async fn on_photo(
        &self,
        transport: &dyn ChatTransport,
        user_id: i64,
        photos: &[PhotoRef],
        caption: Option<&str>,
    ) -> Result<()> {
        if !self
            .ensure_allowed(transport, user_id, PHOTO_ERROR_REPLY)
            .await?
        {
            return Ok(());
        }
        let Some(photo) = media::select_largest_photo(photos) else {
            warn!("Photo message from user {user_id} had no sizes");
            transport
                .send_text(views::PHOTO_INFO_MISSING, TextFormat::Plain)
                .await?;
            return Ok(());
        };

        info!(
            "Photo from user {user_id}: {}x{} ({} bytes)",
            photo.width, photo.height, photo.file_size
        );
        transport
            .send_text(views::WAIT_PHOTO, TextFormat::Plain)
            .await?;

        let reply = match self.download(transport, &photo.file_id, "jpg").await {
            Ok(path) => {
                typing(transport).await;
                self.driver.process_photo(&path, caption).await
            }
            Err(e) => {
                error!("Failed to download photo for user {user_id}: {e}");
                PHOTO_ERROR_REPLY.to_string()
            }
        };
        send_long_message(transport, &reply).await
    }

    /// Voice message
    ///
    /// # Errors
    ///
    /// Returns an error if a reply cannot be sent.
    pub async fn on_voice(
        &self,
        transport: &dyn ChatTransport,
        user_id: i64,
        file_id: &str,
    ) -> Result<()> {
        if !self
            .ensure_allowed(transport, user_id, VOICE_ERROR_REPLY)
            .await?
        {
            return Ok(());
        }
        info!("Voice message from user {user_id}");

        let reply = match self.download(transport, file_id, "ogg").await {
            Ok(path) => {
                typing(transport).await;
                self.driver.process_voice(&path).await
            }
            Err(e) => {
                error!("Failed to download voice for user {user_id}: {e}");
                VOICE_ERROR_REPLY.to_string()
            }
        };
        send_long_message(transport, &reply).await
    }

    async fn download(
        &self,
        transport: &dyn ChatTransport,
        file_id: &str,
        extension: &str,
    ) -> Result<PathBuf> {
        let bytes = transport.fetch_file(file_id).await?;
        let path = media::save_download(&self.downloads_dir, file_id, extension, &bytes).await?;
        Ok(path)
    }
}

async fn typing(transport: &dyn ChatTransport) {
    if let Err(e) = transport.send_typing().await {
        warn!("Failed to send typing action: {e}");
    }
}
