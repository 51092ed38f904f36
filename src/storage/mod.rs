//! Storage layer for users, the allow-list and chat history
//!
//! [`StorageProvider`] is the seam between the bot and persistence. Two
//! backends implement it: [`R2Storage`] (Cloudflare R2 / AWS S3 JSON objects)
//! and [`InMemoryStorage`] (process memory, used for local runs and tests).

mod memory;
mod r2;

pub use memory::InMemoryStorage;
pub use r2::R2Storage;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting or deleting an object in S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
    /// A multi-row write was aborted; none of its rows were stored
    #[error("Transaction aborted: {0}")]
    Transaction(String),
}

/// Author of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageRole {
    /// Text written by the Telegram user
    User,
    /// Reply generated by the model
    Model,
}

/// A message in the chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Sequence number, unique per user
    pub id: u64,
    /// Owner of the message
    pub user_id: i64,
    /// Text content of the message
    pub content: String,
    /// Who wrote it
    pub role: MessageRole,
    /// Insertion time, strictly increasing per user
    pub created_at: DateTime<Utc>,
}

/// Bot user record, created lazily on the first text message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Telegram user ID
    pub id: i64,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Context window returned by [`StorageProvider::load_history_window`]
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    /// Retained messages, oldest first
    pub messages: Vec<StoredMessage>,
    /// How many of the oldest messages were deleted by this read
    pub trimmed: usize,
}

/// Result of removing a user from the allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The record existed and was deleted
    Removed,
    /// There was no record for this user
    NotFound,
}

/// Interface for storage providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Create the user record if it does not exist. Returns `true` if it was created.
    async fn ensure_user(&self, user_id: i64) -> Result<bool, StorageError>;
    /// Whether the user has an allow-list record
    async fn is_allowed_user(&self, user_id: i64) -> Result<bool, StorageError>;
    /// Insert an allow-list record; no-op if it already exists
    async fn upsert_allowed_user(&self, user_id: i64) -> Result<(), StorageError>;
    /// Delete an allow-list record
    async fn delete_allowed_user(&self, user_id: i64) -> Result<RemoveOutcome, StorageError>;
    /// All allow-listed user IDs
    async fn list_allowed_users(&self) -> Result<Vec<i64>, StorageError>;
    /// Delete the oldest messages beyond `cap`, then return the remaining
    /// (at most `cap`) messages oldest-first.
    async fn load_history_window(
        &self,
        user_id: i64,
        cap: usize,
    ) -> Result<HistoryWindow, StorageError>;
    /// Store a user message and the model reply as one atomic unit
    async fn append_turn(
        &self,
        user_id: i64,
        user_content: String,
        model_content: String,
    ) -> Result<(), StorageError>;
    /// Number of stored messages for a user
    async fn message_count(&self, user_id: i64) -> Result<usize, StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

/// Ordered message log of one user, as persisted by both backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryLog {
    /// Next sequence number to assign
    pub next_id: u64,
    /// Messages ordered by `created_at`, oldest first
    pub messages: Vec<StoredMessage>,
}

impl HistoryLog {
    /// Append a message, assigning its id and a timestamp later than any stored one.
    pub fn push(&mut self, user_id: i64, role: MessageRole, content: String) {
        let now = Utc::now();
        let created_at = match self.messages.last() {
            Some(last) if last.created_at >= now => last.created_at + Duration::microseconds(1),
            _ => now,
        };
        self.next_id += 1;
        self.messages.push(StoredMessage {
            id: self.next_id,
            user_id,
            content,
            role,
            created_at,
        });
    }

    /// Delete the oldest messages so that at most `cap` remain. Returns how many were deleted.
    pub fn trim_to(&mut self, cap: usize) -> usize {
        let excess = self.messages.len().saturating_sub(cap);
        if excess > 0 {
            self.messages.drain(..excess);
        }
        excess
    }

    /// The `cap` most recent messages, oldest first
    #[must_use]
    pub fn window(&self, cap: usize) -> Vec<StoredMessage> {
        let start = self.messages.len().saturating_sub(cap);
        self.messages[start..].to_vec()
    }
}

/// Returns the R2 key for a user's profile record
#[must_use]
pub fn user_profile_key(user_id: i64) -> String {
    format!("users/{user_id}/profile.json")
}

/// Returns the R2 key for a user's chat history file
#[must_use]
pub fn user_history_key(user_id: i64) -> String {
    format!("users/{user_id}/history.json")
}

/// R2 key of the allow-list object
pub const ALLOWED_USERS_KEY: &str = "access/allowed_users.json";
