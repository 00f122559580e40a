//! Generation backend abstractions.
//!
//! A backend is an opaque, priced generator: prompt in, text and token
//! counts out. The router only knows backends through [`Backend`] and their
//! [`BackendProfile`]; the [`BackendRegistry`] ties registered instances to
//! the pricing profiles of the routing policy.
//!
//! ## Security
//!
//! Backends that need an API key hold it as an
//! [`ApiCredential`](crate::secrets::ApiCredential).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tollgate_core::{BackendProfile, RoutingPolicy};

use crate::config::ConfigError;
use crate::secrets::CredentialError;

mod factory;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use factory::{BackendFactory, BackendFactoryRegistry};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicBackend, AnthropicBackendFactory};

/// Errors from a backend invocation.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Authentication failed")]
    Auth,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl BackendError {
    /// Whether the same call could succeed if retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(_) | BackendError::RateLimited { .. } | BackendError::Timeout(_) => true,
            BackendError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Per-invocation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeParams {
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for InvokeParams {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Text produced by a backend, with the tokens it was billed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// A priced generation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate text for a prompt.
    async fn invoke(&self, prompt: &str, params: &InvokeParams) -> Result<Generation, BackendError>;

    /// Static pricing and capability profile.
    fn profile(&self) -> &BackendProfile;

    fn id(&self) -> &str {
        &self.profile().id
    }

    /// Whether the backend is usable right now.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Registered backend instances, keyed by id.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any with the same id.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.id().to_string(), backend);
    }

    pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.backends.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Cross-check registrations against a policy.
    ///
    /// Every registered backend must have a pricing profile in the policy
    /// with the same id, and every routing-table target must be registered.
    pub fn check_against(&self, policy: &RoutingPolicy) -> Result<(), ConfigError> {
        for (id, backend) in &self.backends {
            let profile = policy
                .backend(id)
                .map_err(|_| ConfigError::Backend(format!("backend '{}' has no pricing profile", id)))?;
            if profile != backend.profile() {
                return Err(ConfigError::Backend(format!(
                    "backend '{}' profile differs from the policy's pricing",
                    id
                )));
            }
        }

        let routing = &policy.routing;
        for target in [
            &routing.structural,
            &routing.visual,
            &routing.creative_premium,
            &routing.creative_default,
        ] {
            if !self.contains(target) {
                return Err(ConfigError::Backend(format!(
                    "routing target '{}' is not registered",
                    target
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend {
        profile: BackendProfile,
    }

    #[async_trait]
    impl Backend for FixedBackend {
        async fn invoke(&self, prompt: &str, _params: &InvokeParams) -> Result<Generation, BackendError> {
            Ok(Generation {
                text: format!("echo: {}", prompt),
                tokens_in: 10,
                tokens_out: 5,
            })
        }

        fn profile(&self) -> &BackendProfile {
            &self.profile
        }
    }

    fn registry_for(policy: &RoutingPolicy) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        for profile in &policy.backends {
            registry.register(Arc::new(FixedBackend {
                profile: profile.clone(),
            }));
        }
        registry
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(BackendError::Api { status: 503, message: "down".into() }.is_transient());
        assert!(!BackendError::Api { status: 400, message: "bad".into() }.is_transient());
        assert!(!BackendError::Auth.is_transient());
    }

    #[test]
    fn test_registry_matches_policy() {
        let policy = RoutingPolicy::default();
        let registry = registry_for(&policy);
        registry.check_against(&policy).unwrap();
        assert_eq!(registry.ids(), vec!["economy", "frontier", "premium", "standard"]);
    }

    #[test]
    fn test_unpriced_backend_rejected() {
        let policy = RoutingPolicy::default();
        let registry = registry_for(&policy).with(Arc::new(FixedBackend {
            profile: BackendProfile::new("mystery", 1.0, 1.0, 1000, 9),
        }));
        assert!(matches!(
            registry.check_against(&policy),
            Err(ConfigError::Backend(msg)) if msg.contains("mystery")
        ));
    }

    #[test]
    fn test_missing_routing_target_rejected() {
        let policy = RoutingPolicy::default();
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(FixedBackend {
            profile: policy.backend("economy").unwrap().clone(),
        }));
        assert!(registry.check_against(&policy).is_err());
    }

    #[tokio::test]
    async fn test_invoke_through_registry() {
        let policy = RoutingPolicy::default();
        let registry = registry_for(&policy);
        let backend = registry.get("economy").unwrap();
        let generation = backend.invoke("hi", &InvokeParams::default()).await.unwrap();
        assert_eq!(generation.text, "echo: hi");
        assert!(backend.health_check().await);
    }
}
