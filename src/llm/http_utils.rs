//! HTTP utilities for the Gemini provider
//!
//! Common request/response handling shared by the generation and upload calls.

use crate::config::get_llm_http_timeout_secs;
use crate::llm::LlmError;
use reqwest::{Client as HttpClient, Response};
use serde_json::Value;
use std::time::Duration;

/// Creates an HTTP client configured with the standard backend timeout.
///
/// Uses `LLM_HTTP_TIMEOUT_SECS` environment variable or the default.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(get_llm_http_timeout_secs());
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Turns a non-success response into `LlmError::ApiError` with a readable message.
///
/// # Errors
///
/// Returns `LlmError::ApiError` if the status is not 2xx.
pub async fn ensure_success(response: Response) -> Result<Response, LlmError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    Err(LlmError::ApiError(describe_error_body(status, &error_text)))
}

fn describe_error_body(status: reqwest::StatusCode, error_text: &str) -> String {
    let trimmed = error_text.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("API error: {status} (Server returned HTML error page)");
    }

    let truncated = if error_text.chars().count() > 500 {
        let cut: String = error_text.chars().take(500).collect();
        format!("{cut}... (truncated)")
    } else {
        error_text.to_string()
    };
    format!("API error: {status} - {truncated}")
}

/// Sends an HTTP POST request with JSON body and returns parsed JSON response.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues, `LlmError::ApiError` on non-success status codes,
/// or `LlmError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
) -> Result<Value, LlmError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.to_string()))?;

    ensure_success(response)
        .await?
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

fn value_at<'a>(response: &'a Value, path: &[&str]) -> Result<&'a Value, LlmError> {
    let mut current = response;

    for segment in path {
        if let Ok(index) = segment.parse::<usize>() {
            current = current.get(index).ok_or_else(|| {
                LlmError::ApiError(format!("Invalid path: missing index {index}"))
            })?;
        } else {
            current = current.get(*segment).ok_or_else(|| {
                LlmError::ApiError(format!("Invalid path: missing key {segment}"))
            })?;
        }
    }
    Ok(current)
}

/// Concatenates the `text` field of every element of the array at `path`.
///
/// Elements without text (e.g. inline data parts) are skipped.
///
/// # Errors
///
/// Returns `LlmError::ApiError` if the path is invalid, the target is not an
/// array, or no element carries text.
pub fn extract_joined_text(response: &Value, path: &[&str]) -> Result<String, LlmError> {
    let parts = value_at(response, path)?
        .as_array()
        .ok_or_else(|| LlmError::ApiError("Expected array of parts".to_string()))?;

    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        return Err(LlmError::ApiError("Response has no text parts".to_string()));
    }
    Ok(texts.concat())
}
