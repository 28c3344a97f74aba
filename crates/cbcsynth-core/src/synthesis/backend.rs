//! Chat-completion backends.
//!
//! Production talks to an OpenAI-compatible endpoint:
//! - request path is `POST <endpoint>/chat/completions`
//! - `Authorization: Bearer <key>` when a key is configured
//! - `response_format = {"type": "json_object"}` in JSON mode
//! - the answer is `choices[0].message.content`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::BackendError;

/// One chat round-trip against a named model.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, model: &str, system: &str, user: &str)
        -> Result<String, BackendError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

/// Backend for any OpenAI-compatible chat-completions service.
pub struct OpenAiBackend {
    http: reqwest::Client,
    endpoint: String,
    temperature: Option<f32>,
    json_mode: bool,
}

impl OpenAiBackend {
    pub fn new(
        endpoint: &str,
        api_key: Option<&str>,
        timeout: Duration,
        temperature: Option<f32>,
        json_mode: bool,
    ) -> Result<Self, BackendError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let hv = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| BackendError::Config(format!("invalid Authorization header: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, hv);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("cbcsynth/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| BackendError::Config(format!("http client build: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            temperature,
            json_mode,
        })
    }

    fn payload(&self, model: &str, system: &str, user: &str) -> Value {
        let mut payload = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
        });
        if let Some(t) = self.temperature {
            payload["temperature"] = json!(t);
        }
        if self.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }
        payload
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let resp = self
            .http
            .post(url)
            .json(&self.payload(model, system, user))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("invalid chat response: {e}")))?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Decode("missing choices[0].message.content".into()))?;
        Ok(content.to_string())
    }
}
