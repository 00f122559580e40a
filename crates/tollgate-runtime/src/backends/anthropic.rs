//! Anthropic Messages API backend.
//!
//! ## Security
//!
//! The API key is held as an [`ApiCredential`] and exposed only when the
//! request header is written.

use super::{factory::BackendFactory, Backend, BackendError, Generation, InvokeParams};
use crate::secrets::{ApiCredential, CredentialOrigin};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::BackendProfile;

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_KEY_LABEL: &str = "Anthropic API key";

/// A backend calling the Anthropic Messages API.
pub struct AnthropicBackend {
    profile: BackendProfile,
    credential: ApiCredential,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("id", &self.profile.id)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(profile: BackendProfile, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            profile,
            credential: ApiCredential::inline(API_KEY_LABEL, api_key),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from JSON config, reading the key from `api_key` or
    /// `ANTHROPIC_API_KEY`.
    pub fn from_config(profile: BackendProfile, config: &JsonValue) -> Result<Self, BackendError> {
        let credential = ApiCredential::resolve(API_KEY_LABEL, config, "api_key", ANTHROPIC_API_KEY_ENV)?;

        Ok(Self {
            profile,
            credential,
            base_url: config["base_url"].as_str().unwrap_or(DEFAULT_BASE_URL).to_string(),
            model: config["model"].as_str().unwrap_or(DEFAULT_MODEL).to_string(),
            client: reqwest::Client::new(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn invoke(&self, prompt: &str, params: &InvokeParams) -> Result<Generation, BackendError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: params.max_tokens,
            system: params.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .timeout(params.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(params.timeout)
                } else {
                    BackendError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BackendError::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BackendError::Auth);
        }
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|e| e.to_string());
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(Generation {
            text,
            tokens_in: body.usage.input_tokens,
            tokens_out: body.usage.output_tokens,
        })
    }

    fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_blank()
    }
}

/// Factory for [`AnthropicBackend`].
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "sk-ant-...",      // Optional, falls back to ANTHROPIC_API_KEY env
///   "base_url": "https://...",     // Optional
///   "model": "claude-sonnet-4-5"   // Optional
/// }
/// ```
pub struct AnthropicBackendFactory;

impl BackendFactory for AnthropicBackendFactory {
    fn kind(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, profile: BackendProfile, config: &JsonValue) -> Result<Arc<dyn Backend>, BackendError> {
        self.validate_config(config)?;
        Ok(Arc::new(AnthropicBackend::from_config(profile, config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), BackendError> {
        if !ApiCredential::is_configured(config, "api_key", ANTHROPIC_API_KEY_ENV) {
            return Err(BackendError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_API_KEY_ENV
            )));
        }
        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(BackendError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "model": DEFAULT_MODEL })
    }

    fn description(&self) -> &'static str {
        "Anthropic Messages API backend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> BackendProfile {
        BackendProfile::new("premium", 3.0, 15.0, 8192, 3)
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret = "sk-ant-REDACTED";
        let backend = AnthropicBackend::new(profile(), secret, DEFAULT_MODEL);
        let debug = format!("{:?}", backend);
        assert!(!debug.contains(secret));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(AnthropicBackend::new(profile(), "k", DEFAULT_MODEL).health_check().await);
        assert!(!AnthropicBackend::new(profile(), "", DEFAULT_MODEL).health_check().await);
    }

    #[test]
    fn test_from_config() {
        let config = serde_json::json!({
            "api_key": "config-api-key",
            "base_url": "https://custom.api.com/v1",
            "model": "claude-haiku-4-5"
        });
        let backend = AnthropicBackend::from_config(profile(), &config).unwrap();
        assert_eq!(backend.base_url, "https://custom.api.com/v1");
        assert_eq!(backend.model, "claude-haiku-4-5");
        assert_eq!(backend.credential.origin(), CredentialOrigin::Config);
        assert_eq!(backend.id(), "premium");
    }

    #[test]
    fn test_factory_rejects_bad_base_url() {
        let config = serde_json::json!({"api_key": "k", "base_url": "invalid-url"});
        assert!(AnthropicBackendFactory.validate_config(&config).is_err());
    }

    #[test]
    fn test_factory_creates_backend() {
        let backend = AnthropicBackendFactory
            .create(profile(), &serde_json::json!({"api_key": "k"}))
            .unwrap();
        assert_eq!(backend.profile().tier_rank, 3);
    }
}
