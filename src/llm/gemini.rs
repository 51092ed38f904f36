use crate::llm::http_utils::{
    create_http_client, ensure_success, extract_joined_text, send_json_request,
};
use crate::llm::{ChatTurn, GenerativeBackend, LlmError, UploadedFile};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";
const PARTS_PATH: &[&str] = &["candidates", "0", "content", "parts"];

/// Backend implementation for Google Gemini
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingConfig` if the API key is empty.
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingConfig("GEMINI_TOKEN is empty".to_string()));
        }
        Ok(Self {
            http_client: create_http_client(),
            api_key,
        })
    }

    fn generate_url(&self, model_id: &str) -> String {
        format!(
            "{GEMINI_API_BASE}/models/{model_id}:generateContent?key={}",
            self.api_key
        )
    }
}

/// Request body for a chat continuation
fn chat_body(history: &[ChatTurn], user_message: &str) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role.as_str(),
                "parts": [{"text": turn.text}]
            })
        })
        .collect();
    contents.push(json!({
        "role": "user",
        "parts": [{"text": user_message}]
    }));
    json!({ "contents": contents })
}

/// Request body for a prompt about an uploaded file
fn file_prompt_body(file: &UploadedFile, prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {"text": prompt},
                {"file_data": {"mime_type": file.mime_type, "file_uri": file.uri}}
            ]
        }]
    })
}

#[async_trait]
impl GenerativeBackend for GeminiProvider {
    async fn chat(
        &self,
        history: &[ChatTurn],
        user_message: &str,
        model_id: &str,
    ) -> Result<String, LlmError> {
        debug!(
            "Gemini chat request: model={model_id}, history_len={}",
            history.len()
        );
        let body = chat_body(history, user_message);
        let res_json = send_json_request(&self.http_client, &self.generate_url(model_id), &body)
            .await?;
        extract_joined_text(&res_json, PARTS_PATH)
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, LlmError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LlmError::UploadError(format!("{}: {e}", path.display())))?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");

        // Resumable protocol: start a session, then send the bytes and finalize
        let start = self
            .http_client
            .post(format!("{GEMINI_UPLOAD_URL}?key={}", self.api_key))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({"file": {"display_name": display_name}}))
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;
        let start = ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| LlmError::UploadError("missing upload session URL".to_string()))?
            .to_string();

        let finished = self
            .http_client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let uploaded: UploadResponse = ensure_success(finished)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::JsonError(e.to_string()))?;

        info!("Uploaded {display_name} to Gemini as {}", uploaded.file.uri);
        Ok(uploaded.file)
    }

    async fn generate_with_file(
        &self,
        file: &UploadedFile,
        prompt: &str,
        model_id: &str,
    ) -> Result<String, LlmError> {
        let body = file_prompt_body(file, prompt);
        let res_json = send_json_request(&self.http_client, &self.generate_url(model_id), &body)
            .await?;
        extract_joined_text(&res_json, PARTS_PATH)
    }
}
