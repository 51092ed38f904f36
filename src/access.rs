//! Access control: configured admins plus a persisted allow-list.

use crate::storage::{RemoveOutcome, StorageError, StorageProvider};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Answers "may this user talk to the bot" and manages the allow-list.
///
/// Admins come from configuration and are fixed for the process lifetime.
/// They are always allowed and never need an allow-list record.
pub struct AccessRegistry {
    admins: HashSet<i64>,
    storage: Arc<dyn StorageProvider>,
}

impl AccessRegistry {
    /// Create a registry over the given admin set and store
    #[must_use]
    pub fn new(admins: HashSet<i64>, storage: Arc<dyn StorageProvider>) -> Self {
        Self { admins, storage }
    }

    /// Whether the user is a configured admin
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Whether the user may use the bot. Admins short-circuit without a store lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the allow-list cannot be read.
    pub async fn is_allowed(&self, user_id: i64) -> Result<bool, StorageError> {
        if self.is_admin(user_id) {
            return Ok(true);
        }
        self.storage.is_allowed_user(user_id).await
    }

    /// Grant access to a user. Adding an already allowed user is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the allow-list cannot be written.
    pub async fn add_allowed_user(&self, user_id: i64) -> Result<(), StorageError> {
        self.storage.upsert_allowed_user(user_id).await?;
        info!("User {user_id} added to the allow-list.");
        Ok(())
    }

    /// Revoke access. Removing a user that is not on the list yields [`RemoveOutcome::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns an error if the allow-list cannot be written.
    pub async fn remove_allowed_user(&self, user_id: i64) -> Result<RemoveOutcome, StorageError> {
        let outcome = self.storage.delete_allowed_user(user_id).await?;
        info!("Allow-list removal for user {user_id}: {outcome:?}");
        Ok(outcome)
    }

    /// Allow-listed users in ascending order
    ///
    /// # Errors
    ///
    /// Returns an error if the allow-list cannot be read.
    pub async fn get_allowed_users(&self) -> Result<Vec<i64>, StorageError> {
        let mut users = self.storage.list_allowed_users().await?;
        users.sort_unstable();
        Ok(users)
    }
}
