//! Backend factories for building backends from configuration.
//!
//! New backend kinds are added by registering a factory, not by editing an
//! enum.
//!
//! ## Usage
//!
//! ```ignore
//! let factories = BackendFactoryRegistry::with_defaults();
//! let profile = policy.backend("premium")?.clone();
//! let backend = factories.create("anthropic", profile, &json!({"model": "claude-sonnet-4-5"}))?;
//! registry.register(backend);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tollgate_core::BackendProfile;

use super::{Backend, BackendError};

/// Builds backends of one kind from JSON configuration.
pub trait BackendFactory: Send + Sync {
    /// Unique kind name, e.g. "anthropic".
    fn kind(&self) -> &'static str;

    /// Create a backend bound to a pricing profile.
    fn create(&self, profile: BackendProfile, config: &JsonValue) -> Result<Arc<dyn Backend>, BackendError>;

    /// Check configuration without creating anything.
    fn validate_config(&self, config: &JsonValue) -> Result<(), BackendError>;

    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "Generation backend"
    }
}

/// Factories by kind.
#[derive(Default)]
pub struct BackendFactoryRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any of the same kind.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(factory.kind().to_string(), factory);
    }

    pub fn create(
        &self,
        kind: &str,
        profile: BackendProfile,
        config: &JsonValue,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        self.factories
            .get(kind)
            .ok_or_else(|| {
                BackendError::NotConfigured(format!(
                    "Unknown backend kind: '{}'. Available: {:?}",
                    kind,
                    self.available_kinds()
                ))
            })?
            .create(profile, config)
    }

    pub fn validate(&self, kind: &str, config: &JsonValue) -> Result<(), BackendError> {
        self.factories
            .get(kind)
            .ok_or_else(|| BackendError::NotConfigured(format!("Unknown backend kind: '{}'", kind)))?
            .validate_config(config)
    }

    pub fn available_kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn default_config(&self, kind: &str) -> Option<JsonValue> {
        self.factories.get(kind).map(|f| f.default_config())
    }

    /// A registry with every built-in factory compiled in.
    #[cfg(feature = "anthropic")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::AnthropicBackendFactory));
        registry
    }

    /// A registry with every built-in factory compiled in.
    #[cfg(not(feature = "anthropic"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackendFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFactoryRegistry")
            .field("kinds", &self.available_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Generation, InvokeParams};
    use async_trait::async_trait;

    struct CannedBackend {
        profile: BackendProfile,
        reply: String,
    }

    #[async_trait]
    impl Backend for CannedBackend {
        async fn invoke(&self, _prompt: &str, _params: &InvokeParams) -> Result<Generation, BackendError> {
            Ok(Generation {
                text: self.reply.clone(),
                tokens_in: 1,
                tokens_out: 1,
            })
        }

        fn profile(&self) -> &BackendProfile {
            &self.profile
        }
    }

    struct CannedFactory;

    impl BackendFactory for CannedFactory {
        fn kind(&self) -> &'static str {
            "canned"
        }

        fn create(&self, profile: BackendProfile, config: &JsonValue) -> Result<Arc<dyn Backend>, BackendError> {
            self.validate_config(config)?;
            Ok(Arc::new(CannedBackend {
                profile,
                reply: config["reply"].as_str().unwrap_or_default().to_string(),
            }))
        }

        fn validate_config(&self, config: &JsonValue) -> Result<(), BackendError> {
            if config["reply"].is_string() {
                Ok(())
            } else {
                Err(BackendError::NotConfigured("'reply' is required".into()))
            }
        }
    }

    #[tokio::test]
    async fn test_registry_creates_backend() {
        let mut registry = BackendFactoryRegistry::new();
        registry.register(Arc::new(CannedFactory));
        assert!(registry.has_kind("canned"));

        let profile = BackendProfile::new("economy", 0.25, 1.25, 4096, 1);
        let backend = registry
            .create("canned", profile, &serde_json::json!({"reply": "ok"}))
            .unwrap();
        assert_eq!(backend.id(), "economy");
        let out = backend.invoke("x", &InvokeParams::default()).await.unwrap();
        assert_eq!(out.text, "ok");
    }

    #[test]
    fn test_unknown_kind() {
        let registry = BackendFactoryRegistry::new();
        let err = registry
            .create("nope", BackendProfile::new("a", 1.0, 1.0, 10, 1), &serde_json::json!({}))
            .err()
            .unwrap();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_validate_delegates() {
        let mut registry = BackendFactoryRegistry::new();
        registry.register(Arc::new(CannedFactory));
        assert!(registry.validate("canned", &serde_json::json!({})).is_err());
        assert!(registry.validate("canned", &serde_json::json!({"reply": "x"})).is_ok());
        assert_eq!(registry.default_config("canned"), Some(serde_json::json!({})));
    }
}
