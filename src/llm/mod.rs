//! Generative backend client
//!
//! [`GenerativeBackend`] is what the dialogue driver talks to; [`GeminiProvider`]
//! implements it over the Google Gemini REST API.

mod gemini;
mod http_utils;

pub use gemini::GeminiProvider;

use crate::storage::MessageRole;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during backend operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// File could not be read or uploaded
    #[error("Upload error: {0}")]
    UploadError(String),
}

/// Speaker of a conversation turn, as the backend names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The human side
    User,
    /// The model side
    Model,
}

impl ChatRole {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl From<MessageRole> for ChatRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Self::User,
            MessageRole::Model => Self::Model,
        }
    }
}

/// One prior message sent to the backend as context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Who said it
    pub role: ChatRole,
    /// What was said
    pub text: String,
}

/// Reference to a file stored on the backend side
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// URI to reference the file in generation requests
    pub uri: String,
    /// MIME type the backend recorded for the file
    pub mime_type: String,
}

/// Interface for generative backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Continue a conversation: prior turns plus the new user message
    async fn chat(
        &self,
        history: &[ChatTurn],
        user_message: &str,
        model_id: &str,
    ) -> Result<String, LlmError>;

    /// Upload a local file so it can be referenced in a prompt
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, LlmError>;

    /// Answer a prompt about an uploaded file
    async fn generate_with_file(
        &self,
        file: &UploadedFile,
        prompt: &str,
        model_id: &str,
    ) -> Result<String, LlmError>;
}
