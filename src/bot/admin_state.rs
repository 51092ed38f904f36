//! Pending admin actions awaiting a user id.
//!
//! The table lives in process memory only: a restart forgets every pending
//! action and the admin's next message is handled as an ordinary query.

use crate::access::AccessRegistry;
use crate::storage::{RemoveOutcome, StorageError};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

/// What the admin asked to do with the next id they send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    /// Waiting for an id to add to the allow-list
    AddUser,
    /// Waiting for an id to remove from the allow-list
    RemoveUser,
}

/// Result of feeding a text message to a pending admin action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminInputOutcome {
    /// The text was not a user id; the action stays pending
    InvalidId,
    /// The user was added
    Added(i64),
    /// The user was removed
    Removed(i64),
    /// Removal requested for a user not on the allow-list
    NotFound(i64),
}

/// Admin id → pending action, at most one entry per admin
#[derive(Default)]
pub struct AdminStateTable {
    pending: Mutex<HashMap<i64, AdminAction>>,
}

impl AdminStateTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a selection; replaces any previous one for this admin
    pub async fn select(&self, admin_id: i64, action: AdminAction) {
        self.pending.lock().await.insert(admin_id, action);
    }

    /// Pending action of an admin, if any
    pub async fn pending(&self, admin_id: i64) -> Option<AdminAction> {
        self.pending.lock().await.get(&admin_id).copied()
    }

    /// Drop the pending action of an admin
    pub async fn clear(&self, admin_id: i64) -> Option<AdminAction> {
        self.pending.lock().await.remove(&admin_id)
    }

    /// Number of admins with a pending action
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether no admin has a pending action
    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Apply `text` to the admin's pending action.
    ///
    /// Returns `Ok(None)` when nothing is pending. On success the entry is
    /// cleared; on an invalid id or a store failure it is kept so the admin
    /// can try again.
    ///
    /// # Errors
    ///
    /// Returns the store error if the allow-list could not be changed.
    pub async fn handle_input(
        &self,
        registry: &AccessRegistry,
        admin_id: i64,
        text: &str,
    ) -> Result<Option<AdminInputOutcome>, StorageError> {
        let Some(action) = self.pending(admin_id).await else {
            return Ok(None);
        };

        let Ok(user_id) = text.trim().parse::<i64>() else {
            info!("Admin {admin_id} sent an invalid user id for {action:?}");
            return Ok(Some(AdminInputOutcome::InvalidId));
        };

        let outcome = match action {
            AdminAction::AddUser => {
                registry.add_allowed_user(user_id).await?;
                AdminInputOutcome::Added(user_id)
            }
            AdminAction::RemoveUser => match registry.remove_allowed_user(user_id).await? {
                RemoveOutcome::Removed => AdminInputOutcome::Removed(user_id),
                RemoveOutcome::NotFound => AdminInputOutcome::NotFound(user_id),
            },
        };

        // Leave a newer selection made meanwhile in place
        let mut pending = self.pending.lock().await;
        if pending.get(&admin_id) == Some(&action) {
            pending.remove(&admin_id);
        }
        Ok(Some(outcome))
    }
}
