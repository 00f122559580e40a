//! Backend API keys and the budget override token.
//!
//! Key material never reaches a log line: `Debug` and `Display` print the
//! credential's label and origin only, and the raw value is available
//! through [`ApiCredential::expose`] at the call site that writes it into a
//! request. The override token is not kept at all; [`AdminCredential`]
//! holds its SHA-256 digest.
//!
//! ```ignore
//! let key = ApiCredential::resolve("Anthropic API key", &config, "api_key", "ANTHROPIC_API_KEY")?;
//! let admin = AdminCredential::from_env()?;
//! let guardrail = guardrail.with_admin(admin);
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Environment variable holding the budget override token.
pub const ADMIN_TOKEN_ENV: &str = "TOLLGATE_ADMIN_TOKEN";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("{label} required: set '{config_key}' in backend config or the {env_var} environment variable")]
    Missing {
        label: &'static str,
        config_key: String,
        env_var: String,
    },

    #[error("{0} not set")]
    Unset(&'static str),

    #[error("{0} is empty")]
    Empty(&'static str),
}

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Passed in by the embedding program
    Inline,
    /// Backend config block
    Config,
    Env,
}

impl fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialOrigin::Inline => "inline",
            CredentialOrigin::Config => "backend config",
            CredentialOrigin::Env => "environment",
        })
    }
}

/// A backend API key.
pub struct ApiCredential {
    secret: SecretString,
    origin: CredentialOrigin,
    label: &'static str,
}

impl ApiCredential {
    pub fn inline(label: &'static str, value: impl Into<String>) -> Self {
        Self::wrap(label, value.into(), CredentialOrigin::Inline)
    }

    fn wrap(label: &'static str, value: String, origin: CredentialOrigin) -> Self {
        Self {
            secret: SecretString::from(value),
            origin,
            label,
        }
    }

    /// Take `config[config_key]` when present, else the `env_var` variable.
    pub fn resolve(
        label: &'static str,
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
    ) -> Result<Self, CredentialError> {
        if let Some(value) = config.get(config_key).and_then(JsonValue::as_str) {
            return Ok(Self::wrap(label, value.to_string(), CredentialOrigin::Config));
        }
        match std::env::var(env_var) {
            Ok(value) => Ok(Self::wrap(label, value, CredentialOrigin::Env)),
            Err(_) => Err(CredentialError::Missing {
                label,
                config_key: config_key.to_string(),
                env_var: env_var.to_string(),
            }),
        }
    }

    /// Whether [`resolve`](Self::resolve) would find a value.
    pub fn is_configured(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config.get(config_key).and_then(JsonValue::as_str).is_some() || std::env::var_os(env_var).is_some()
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }

    pub fn origin(&self) -> CredentialOrigin {
        self.origin
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential({}, {}, [REDACTED])", self.label, self.origin)
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.origin)
    }
}

/// The token that authorizes a budget override, held as a digest.
pub struct AdminCredential {
    digest: [u8; 32],
    origin: CredentialOrigin,
}

impl AdminCredential {
    const LABEL: &'static str = "Admin override token";

    /// Empty or whitespace-only tokens are rejected.
    pub fn new(token: impl Into<String>) -> Result<Self, CredentialError> {
        Self::hashed(&token.into(), CredentialOrigin::Inline)
    }

    /// Load from `TOLLGATE_ADMIN_TOKEN`.
    pub fn from_env() -> Result<Self, CredentialError> {
        let token = std::env::var(ADMIN_TOKEN_ENV).map_err(|_| CredentialError::Unset(ADMIN_TOKEN_ENV))?;
        Self::hashed(&token, CredentialOrigin::Env)
    }

    fn hashed(token: &str, origin: CredentialOrigin) -> Result<Self, CredentialError> {
        if token.trim().is_empty() {
            return Err(CredentialError::Empty(Self::LABEL));
        }
        Ok(Self {
            digest: Sha256::digest(token.as_bytes()).into(),
            origin,
        })
    }

    /// Whether `presented` is the override token.
    ///
    /// Digests are compared in full, whatever the position of the first
    /// differing byte.
    pub fn verify(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        self.digest
            .iter()
            .zip(presented.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    pub fn origin(&self) -> CredentialOrigin {
        self.origin
    }
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdminCredential({})", self.origin)
    }
}

impl fmt::Display for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", Self::LABEL, self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_never_formatted() {
        let key = "sk-tollgate-0123456789";
        let cred = ApiCredential::inline("Economy key", key);
        let printed = format!("{:?} {}", cred, cred);
        assert!(!printed.contains(key));
        assert!(printed.contains("[REDACTED]"));
        assert!(printed.contains("Economy key (inline)"));
    }

    #[test]
    fn test_resolve_prefers_backend_config() {
        std::env::set_var("TOLLGATE_TEST_RESOLVE_KEY", "from-env");
        let cred = ApiCredential::resolve(
            "Test key",
            &serde_json::json!({"api_key": "from-config"}),
            "api_key",
            "TOLLGATE_TEST_RESOLVE_KEY",
        )
        .unwrap();
        assert_eq!(cred.expose(), "from-config");
        assert_eq!(cred.origin(), CredentialOrigin::Config);

        let cred = ApiCredential::resolve("Test key", &serde_json::json!({}), "api_key", "TOLLGATE_TEST_RESOLVE_KEY")
            .unwrap();
        assert_eq!(cred.origin(), CredentialOrigin::Env);
        std::env::remove_var("TOLLGATE_TEST_RESOLVE_KEY");
    }

    #[test]
    fn test_resolve_names_both_sources_when_missing() {
        let config = serde_json::json!({});
        assert!(!ApiCredential::is_configured(&config, "api_key", "TOLLGATE_TEST_ABSENT_KEY"));
        let err = ApiCredential::resolve("Test key", &config, "api_key", "TOLLGATE_TEST_ABSENT_KEY").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'api_key'"));
        assert!(message.contains("TOLLGATE_TEST_ABSENT_KEY"));
    }

    #[test]
    fn test_admin_verify() {
        let admin = AdminCredential::new("open-sesame").unwrap();
        assert!(admin.verify("open-sesame"));
        assert!(!admin.verify("open-sesamE"));
        assert!(!admin.verify("open"));
        assert!(!format!("{:?} {}", admin, admin).contains("open-sesame"));
    }

    #[test]
    fn test_admin_rejects_blank() {
        assert!(matches!(AdminCredential::new("  "), Err(CredentialError::Empty(_))));
    }
}
