//! Process-memory backend. Nothing survives a restart.

use super::{
    HistoryLog, HistoryWindow, MessageRole, RemoveOutcome, StorageError, StorageProvider,
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory storage implementation
#[derive(Default)]
pub struct InMemoryStorage {
    users: RwLock<HashSet<i64>>,
    allowed: RwLock<BTreeSet<i64>>,
    histories: RwLock<HashMap<i64, HistoryLog>>,
    /// 1-based row index at which the next `append_turn` fails; 0 disables
    fail_insert_at: AtomicUsize,
}

impl InMemoryStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next turn append fail when inserting row `row` (1 = user row, 2 = model row).
    pub fn fail_next_turn_at(&self, row: usize) {
        self.fail_insert_at.store(row, Ordering::SeqCst);
    }

    /// Append a single message outside of a turn, e.g. to seed history.
    pub async fn insert_message(&self, user_id: i64, role: MessageRole, content: String) {
        let mut histories = self.histories.write().await;
        histories
            .entry(user_id)
            .or_default()
            .push(user_id, role, content);
    }

    /// Snapshot of the stored log for a user
    pub async fn history(&self, user_id: i64) -> HistoryLog {
        self.histories
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a user record exists
    pub async fn has_user(&self, user_id: i64) -> bool {
        self.users.read().await.contains(&user_id)
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorage {
    async fn ensure_user(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(self.users.write().await.insert(user_id))
    }

    async fn is_allowed_user(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(self.allowed.read().await.contains(&user_id))
    }

    async fn upsert_allowed_user(&self, user_id: i64) -> Result<(), StorageError> {
        self.allowed.write().await.insert(user_id);
        Ok(())
    }

    async fn delete_allowed_user(&self, user_id: i64) -> Result<RemoveOutcome, StorageError> {
        if self.allowed.write().await.remove(&user_id) {
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::NotFound)
        }
    }

    async fn list_allowed_users(&self) -> Result<Vec<i64>, StorageError> {
        Ok(self.allowed.read().await.iter().copied().collect())
    }

    async fn load_history_window(
        &self,
        user_id: i64,
        cap: usize,
    ) -> Result<HistoryWindow, StorageError> {
        let mut histories = self.histories.write().await;
        let Some(history) = histories.get_mut(&user_id) else {
            return Ok(HistoryWindow::default());
        };
        let trimmed = history.trim_to(cap);
        Ok(HistoryWindow {
            messages: history.window(cap),
            trimmed,
        })
    }

    async fn append_turn(
        &self,
        user_id: i64,
        user_content: String,
        model_content: String,
    ) -> Result<(), StorageError> {
        let fail_at = self.fail_insert_at.swap(0, Ordering::SeqCst);
        let mut histories = self.histories.write().await;

        // Rows go into a staged copy that replaces the log only after every insert succeeded
        let mut staged = histories.get(&user_id).cloned().unwrap_or_default();
        let rows = [
            (MessageRole::User, user_content),
            (MessageRole::Model, model_content),
        ];
        for (index, (role, content)) in rows.into_iter().enumerate() {
            if fail_at == index + 1 {
                return Err(StorageError::Transaction(format!(
                    "insert of row {} failed for user {user_id}",
                    index + 1
                )));
            }
            staged.push(user_id, role, content);
        }

        histories.insert(user_id, staged);
        Ok(())
    }

    async fn message_count(&self, user_id: i64) -> Result<usize, StorageError> {
        Ok(self
            .histories
            .read()
            .await
            .get(&user_id)
            .map_or(0, |h| h.messages.len()))
    }

    async fn check_connection(&self) -> Result<(), String> {
        Ok(())
    }
}
