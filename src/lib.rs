#![deny(missing_docs)]
//! Gemini chat bot for Telegram
//!
//! Answers text, photo and voice messages with Google Gemini, keeps a bounded
//! per-user conversation history and restricts access to an allow-list
//! managed by configured admins.

/// Access control: admins and the allow-list
pub mod access;
/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// History-windowing dialogue driver
pub mod conversation;
/// Generative backend client
pub mod llm;
/// Redacting log output
pub mod logging;
/// Downloaded media files
pub mod media;
/// Storage layer (R2/S3 or memory)
pub mod storage;
/// Text splitting and retry helpers
pub mod utils;
