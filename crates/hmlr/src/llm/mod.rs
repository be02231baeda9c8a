//! LLM Client
//!
//! The `LlmClient` trait is the seam every pipeline stage talks through;
//! the shipped implementation targets any OpenAI-compatible
//! chat-completions endpoint and supports a strict-JSON response mode.
//! `call_llm` wraps a client with the shared timeout-and-retry-once
//! policy for transient failures.

pub mod extract;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{HmlrError, HmlrResult};

/// Requested response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free-form text
    Text,
    /// Strict JSON object mode
    JsonObject,
}

/// Client for a chat-completion LLM
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue one prompt and return the raw completion text
    async fn query(
        &self,
        prompt: &str,
        model: &str,
        format: ResponseFormat,
    ) -> HmlrResult<String>;
}

/// One call under the shared failure policy: each attempt is bounded by
/// `timeout`, and a transient failure earns exactly one retry.
pub async fn call_llm(
    client: &dyn LlmClient,
    prompt: &str,
    model: &str,
    format: ResponseFormat,
    timeout: Duration,
) -> HmlrResult<String> {
    match attempt(client, prompt, model, format, timeout).await {
        Ok(response) => Ok(response),
        Err(e) if e.is_transient() => {
            warn!(model, error = %e, "llm call failed, retrying once");
            attempt(client, prompt, model, format, timeout).await
        }
        Err(e) => Err(e),
    }
}

async fn attempt(
    client: &dyn LlmClient,
    prompt: &str,
    model: &str,
    format: ResponseFormat,
    timeout: Duration,
) -> HmlrResult<String> {
    match tokio::time::timeout(timeout, client.query(prompt, model, format)).await {
        Ok(result) => result,
        Err(_) => Err(HmlrError::timeout(timeout.as_millis() as u64)),
    }
}

/// Client for OpenAI-compatible chat-completions endpoints
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn build_body(&self, prompt: &str, model: &str, format: ResponseFormat) -> serde_json::Value {
        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if format == ResponseFormat::JsonObject {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn query(
        &self,
        prompt: &str,
        model: &str,
        format: ResponseFormat,
    ) -> HmlrResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model, url = %url, "llm request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(prompt, model, format))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HmlrError::llm(format!(
                "endpoint returned {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| HmlrError::llm("completion payload missing message content"))
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
