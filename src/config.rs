//! Configuration and settings management
//!
//! Loads settings from environment variables and defines bot constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_bot_token: String,

    /// Gemini API key
    pub gemini_token: String,

    /// Comma-separated list of admin user IDs
    #[serde(rename = "admin_ids")]
    pub admin_ids_str: Option<String>,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,

    /// Directory for temporarily downloaded media
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,

    /// Model used for text dialogue
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model used for photo and voice messages
    #[serde(default = "default_media_model")]
    pub media_model: String,
}

fn default_downloads_dir() -> String {
    "./downloads".to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_media_model() -> String {
    DEFAULT_MEDIA_MODEL.to_string()
}

/// Build the layered configuration source shared by all settings loaders.
///
/// # Errors
///
/// Returns a `ConfigError` if a present configuration file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg.. `APP_CHAT_MODEL=gemini-2.0-flash ./target/app`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Plain variables: TELEGRAM_BOT_TOKEN -> telegram_bot_token
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gemini_chat_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Direct env fallback for R2 keys the automatic mapping may miss
        for (slot, var) in [
            (&mut settings.r2_endpoint_url, "R2_ENDPOINT_URL"),
            (&mut settings.r2_access_key_id, "R2_ACCESS_KEY_ID"),
            (&mut settings.r2_secret_access_key, "R2_SECRET_ACCESS_KEY"),
            (&mut settings.r2_bucket_name, "R2_BUCKET_NAME"),
        ] {
            if slot.is_none() {
                if let Ok(val) = std::env::var(var) {
                    if !val.is_empty() {
                        *slot = Some(val);
                    }
                }
            }
        }

        Ok(settings)
    }

    /// Returns the set of Telegram IDs with admin rights
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<i64> {
        parse_id_list(self.admin_ids_str.as_deref())
    }

    /// Whether every R2 setting needed for persistent storage is present
    #[must_use]
    pub fn r2_configured(&self) -> bool {
        self.r2_endpoint_url.is_some()
            && self.r2_access_key_id.is_some()
            && self.r2_secret_access_key.is_some()
            && self.r2_bucket_name.is_some()
    }

    /// Directory where photos and voice messages are stored while processed
    #[must_use]
    pub fn downloads_path(&self) -> PathBuf {
        PathBuf::from(&self.downloads_dir)
    }
}

/// Parse a list of numeric IDs separated by commas, semicolons or whitespace.
///
/// Tokens that are not valid integers are skipped.
#[must_use]
pub fn parse_id_list(raw: Option<&str>) -> HashSet<i64> {
    raw.map(|s| {
        s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .filter_map(|id| id.parse::<i64>().ok())
            .collect()
    })
    .unwrap_or_default()
}

/// Number of turns kept per user; the stored log holds at most twice this many messages
pub const MAX_MESSAGES: usize = 100;

/// Retention cap on stored messages per user
pub const HISTORY_RETENTION_CAP: usize = MAX_MESSAGES * 2;

/// Telegram's hard limit on the length of one text message
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Default model for text dialogue
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash-lite";
/// Default model for photo and voice messages
pub const DEFAULT_MEDIA_MODEL: &str = "gemini-2.0-flash";

/// Prompt used for photos sent without a caption
pub const PHOTO_DEFAULT_PROMPT: &str = "Опиши, что ты видишь на картинке";
/// Prompt used for voice messages
pub const VOICE_PROMPT: &str = "Ответь на голосовое сообщение";
/// MIME type Telegram uses for voice notes
pub const VOICE_MIME_TYPE: &str = "audio/ogg";
/// MIME type used for downloaded photos
pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

/// Initial backoff for Telegram file operations
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram file operations
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum attempts for Telegram file operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Default HTTP timeout for generative backend requests
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 120;

/// Get the backend HTTP timeout from env or default.
///
/// Environment variable: `LLM_HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_llm_http_timeout_secs() -> u64 {
    std::env::var("LLM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LLM_HTTP_TIMEOUT_SECS)
}
