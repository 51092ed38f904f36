//! Cloudflare R2 / AWS S3 backend
//!
//! Every record is a JSON object. A user's whole message log lives in one
//! object, so a turn append is a single `put_object` and cannot be half-written.

use super::{
    user_history_key, user_profile_key, HistoryLog, HistoryWindow, MessageRole, RemoveOutcome,
    StorageError, StorageProvider, UserProfile, ALLOWED_USERS_KEY,
};
use crate::config::Settings;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use chrono::Utc;
use moka::future::Cache;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// R2-backed storage implementation
pub struct R2Storage {
    client: Client,
    bucket: String,
    cache: Cache<String, Arc<Vec<u8>>>,
    /// Held across the read-modify-write of the allow-list object
    allow_list_lock: Mutex<()>,
}

impl R2Storage {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60 * 60))
            .time_to_idle(Duration::from_secs(30 * 60))
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
            cache,
            allow_list_lock: Mutex::new(()),
        })
    }

    /// Save data as JSON to R2
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization or S3 upload fails.
    pub async fn save_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let body_bytes = serde_json::to_vec(data)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body_bytes.clone()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        // Cache only what R2 accepted so a failed write leaves no trace
        self.cache
            .insert(key.to_string(), Arc::new(body_bytes))
            .await;

        Ok(())
    }

    /// Load data from JSON in R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 download or JSON deserialization fails.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        if let Some(cached_data) = self.cache.get(key).await {
            match serde_json::from_slice(&cached_data) {
                Ok(data) => return Ok(Some(data)),
                Err(e) => {
                    warn!("Cache deserialization failed for {}: {}", key, e);
                    self.cache.invalidate(key).await;
                }
            }
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
                    .into_bytes();

                self.cache
                    .insert(key.to_string(), Arc::new(data.to_vec()))
                    .await;

                Ok(Some(serde_json::from_slice(&data)?))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    async fn load_allow_list(&self) -> Result<BTreeSet<i64>, StorageError> {
        Ok(self.load_json(ALLOWED_USERS_KEY).await?.unwrap_or_default())
    }

    async fn load_history(&self, user_id: i64) -> Result<HistoryLog, StorageError> {
        Ok(self
            .load_json(&user_history_key(user_id))
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl StorageProvider for R2Storage {
    async fn ensure_user(&self, user_id: i64) -> Result<bool, StorageError> {
        let key = user_profile_key(user_id);
        if self.load_json::<UserProfile>(&key).await?.is_some() {
            return Ok(false);
        }
        let profile = UserProfile {
            id: user_id,
            created_at: Utc::now(),
        };
        self.save_json(&key, &profile).await?;
        Ok(true)
    }

    async fn is_allowed_user(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(self.load_allow_list().await?.contains(&user_id))
    }

    async fn upsert_allowed_user(&self, user_id: i64) -> Result<(), StorageError> {
        let _guard = self.allow_list_lock.lock().await;
        let mut allowed = self.load_allow_list().await?;
        if allowed.insert(user_id) {
            self.save_json(ALLOWED_USERS_KEY, &allowed).await?;
        }
        Ok(())
    }

    async fn delete_allowed_user(&self, user_id: i64) -> Result<RemoveOutcome, StorageError> {
        let _guard = self.allow_list_lock.lock().await;
        let mut allowed = self.load_allow_list().await?;
        if !allowed.remove(&user_id) {
            return Ok(RemoveOutcome::NotFound);
        }
        self.save_json(ALLOWED_USERS_KEY, &allowed).await?;
        Ok(RemoveOutcome::Removed)
    }

    async fn list_allowed_users(&self) -> Result<Vec<i64>, StorageError> {
        Ok(self.load_allow_list().await?.into_iter().collect())
    }

    async fn load_history_window(
        &self,
        user_id: i64,
        cap: usize,
    ) -> Result<HistoryWindow, StorageError> {
        let mut history = self.load_history(user_id).await?;
        let trimmed = history.trim_to(cap);
        if trimmed > 0 {
            debug!("Trimming {trimmed} oldest messages for user {user_id}");
            self.save_json(&user_history_key(user_id), &history).await?;
        }
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
        let mut history = self.load_history(user_id).await?;
        history.push(user_id, MessageRole::User, user_content);
        history.push(user_id, MessageRole::Model, model_content);
        self.save_json(&user_history_key(user_id), &history).await
    }

    async fn message_count(&self, user_id: i64) -> Result<usize, StorageError> {
        Ok(self.load_history(user_id).await?.messages.len())
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.client.list_buckets().send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}
