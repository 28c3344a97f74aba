//! Synthesis client: request building, model call with one fallback,
//! tolerant response parsing.

pub mod backend;
pub mod parse;
pub mod request;
pub mod shrink;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{BackendError, CbcError, Result};
use crate::variables::Variable;

pub use backend::{CompletionBackend, OpenAiBackend};
pub use parse::parse_code;
pub use request::{SynthesisRequest, SYSTEM_PROMPT};
pub use shrink::{shrink, DEFAULT_MAX_INPUT_CHARS};

/// Configuration for the synthesis client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisConfig {
    /// Base URL of the OpenAI-compatible service.
    pub endpoint: String,
    /// Bearer token, if the service needs one.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    pub primary_model: String,
    /// Called once if the primary call fails. `None` disables the fallback.
    pub fallback_model: Option<String>,
    /// Cap on each shrunk PRE/POST field.
    pub max_input_chars: usize,
    pub temperature: Option<f32>,
    /// Ask the service for a JSON object response.
    pub json_mode: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
            primary_model: "gpt-5".to_string(),
            fallback_model: Some("gpt-4o".to_string()),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            temperature: None,
            json_mode: true,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SynthesisConfig {
    /// Defaults overridden by `CBCSYNTH_*` variables and `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_nonempty("CBCSYNTH_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: env_nonempty("CBCSYNTH_API_KEY").or_else(|| env_nonempty("OPENAI_API_KEY")),
            timeout_secs: env_nonempty("CBCSYNTH_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            primary_model: env_nonempty("CBCSYNTH_PRIMARY_MODEL")
                .unwrap_or(defaults.primary_model),
            fallback_model: env_nonempty("CBCSYNTH_FALLBACK_MODEL").or(defaults.fallback_model),
            ..defaults
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Validated synthesis answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// Non-empty code with any JSON or fence wrapper removed.
    pub code: String,
    /// Model that produced `code`.
    pub model: String,
    /// 1 for the primary model, 2 when the fallback answered.
    pub attempts: u32,
}

/// Client for the generative service. Never touches the filesystem.
#[derive(Clone)]
pub struct SynthesisClient {
    config: SynthesisConfig,
    backend: Arc<dyn CompletionBackend>,
}

impl SynthesisClient {
    /// Client speaking the OpenAI-compatible protocol.
    pub fn new(config: SynthesisConfig) -> std::result::Result<Self, BackendError> {
        let backend = OpenAiBackend::new(
            &config.endpoint,
            config.api_key.as_deref(),
            config.timeout(),
            config.temperature,
            config.json_mode,
        )?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Client over an arbitrary backend.
    pub fn with_backend(config: SynthesisConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Ask for a statement block turning `pre` into `post`.
    ///
    /// One call to the primary model; if it fails for any reason (transport,
    /// status, decode, no usable code) the fallback model is called once
    /// with the identical request.
    #[instrument(skip_all, fields(vars = variables.len(), loop_update = loop_update))]
    pub async fn synthesize(
        &self,
        variables: &[Variable],
        pre: &str,
        post: &str,
        loop_update: bool,
    ) -> Result<SynthesisResult> {
        let request =
            SynthesisRequest::new(variables, pre, post, loop_update, self.config.max_input_chars);
        let user = request.to_user_message()?;

        let primary = &self.config.primary_model;
        let primary_err = match self.attempt(1, primary, &user).await {
            Ok(code) => {
                return Ok(SynthesisResult {
                    code,
                    model: primary.clone(),
                    attempts: 1,
                })
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.config.fallback_model else {
            return Err(CbcError::SynthesisFailed(format!(
                "{primary}: {primary_err}"
            )));
        };
        warn!(model = %primary, error = %primary_err, fallback = %fallback, "primary model failed, trying fallback");

        match self.attempt(2, fallback, &user).await {
            Ok(code) => Ok(SynthesisResult {
                code,
                model: fallback.clone(),
                attempts: 2,
            }),
            Err(fallback_err) => Err(CbcError::SynthesisFailed(format!(
                "{primary}: {primary_err}; {fallback}: {fallback_err}"
            ))),
        }
    }

    async fn attempt(
        &self,
        attempt: u32,
        model: &str,
        user: &str,
    ) -> std::result::Result<String, String> {
        let start = Instant::now();
        let call = self.backend.complete(model, SYSTEM_PROMPT, user);
        let body = match tokio::time::timeout(self.config.timeout(), call).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => {
                return Err(BackendError::Transport(format!(
                    "timed out after {}s",
                    self.config.timeout_secs
                ))
                .to_string())
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match parse::parse_code_with_strategy(&body) {
            Some((strategy, code)) => {
                info!(model, attempt, strategy, elapsed_ms, "model returned code");
                Ok(code)
            }
            None => {
                warn!(model, attempt, elapsed_ms, "no usable code in response");
                Err(format!("no usable code in response ({} bytes)", body.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SynthesisConfig::default();
        assert_eq!(config.primary_model, "gpt-5");
        assert!(config.fallback_model.is_some());
        assert!(config.json_mode);
        assert_eq!(config.max_input_chars, DEFAULT_MAX_INPUT_CHARS);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = SynthesisConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
