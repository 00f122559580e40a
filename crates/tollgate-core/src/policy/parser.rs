//! Routing policy parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_policy_schema;
use crate::types::BackendProfile;

/// Errors that can occur when loading a routing policy.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Policy does not match schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Policy validation failed: {0}")]
    Validation(String),

    #[error("Unknown backend id: {0}")]
    UnknownBackend(String),
}

/// Which backend handles each task shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingTable {
    /// Formatting and schema work
    pub structural: String,

    /// Image-adjacent work
    pub visual: String,

    /// Creative work above the premium threshold or requiring reasoning
    pub creative_premium: String,

    /// All other creative work
    pub creative_default: String,

    /// Complexity score above which creative work goes premium
    #[serde(default = "default_premium_threshold")]
    pub premium_threshold: f64,
}

fn default_premium_threshold() -> f64 {
    0.7
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            structural: "economy".to_string(),
            visual: "standard".to_string(),
            creative_premium: "premium".to_string(),
            creative_default: "standard".to_string(),
            premium_threshold: default_premium_threshold(),
        }
    }
}

/// Monthly utilization percentages at which alerts fire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertThresholds {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warning: 70.0,
            critical: 85.0,
            emergency: 95.0,
        }
    }
}

/// Hard spending limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetLimits {
    /// No single attempt may be estimated above this
    pub per_request_ceiling_usd: f64,
    pub hourly_limit_usd: f64,
    pub daily_limit_usd: f64,
    pub monthly_limit_usd: f64,
    pub alert_thresholds: AlertThresholds,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            per_request_ceiling_usd: 2.0,
            hourly_limit_usd: 5.0,
            daily_limit_usd: 20.0,
            monthly_limit_usd: 200.0,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

/// Weights of each quality sub-score in the composite.
///
/// `brand` applies to ordinary tasks, `brand_sensitive_brand` to client-facing
/// or final-deliverable tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityWeights {
    pub relevance: f64,
    pub coherence: f64,
    pub brand: f64,
    pub brand_sensitive_brand: f64,
    pub toxicity: f64,
    pub grounding: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            relevance: 0.3,
            coherence: 0.2,
            brand: 0.0,
            brand_sensitive_brand: 0.2,
            toxicity: 0.15,
            grounding: 0.3,
        }
    }
}

/// A (score, grounding) pair that must both be met.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GateThreshold {
    pub score: f64,
    pub grounding: f64,
}

/// Allow/deny vocabulary for brand conformance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BrandRules {
    pub preferred: Vec<String>,
    pub banned: Vec<String>,
}

/// Quality gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityPolicy {
    pub weights: QualityWeights,
    pub deliver: GateThreshold,
    pub rephrase: GateThreshold,
    pub brand: BrandRules,

    /// Upper bound on claims checked for grounding per output
    pub max_claims: usize,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            deliver: GateThreshold {
                score: 0.8,
                grounding: 0.7,
            },
            rephrase: GateThreshold {
                score: 0.6,
                grounding: 0.5,
            },
            brand: BrandRules::default(),
            max_claims: 8,
        }
    }
}

/// Keyword sets for the shape classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub structural_keywords: Vec<String>,
    pub visual_keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let structural = [
            "format", "reformat", "json", "yaml", "csv", "xml", "schema", "table", "convert",
            "extract", "parse", "template", "outline", "fields", "normalize", "bullet points",
        ];
        let visual = [
            "image", "visual", "design", "layout", "logo", "color", "colour", "palette",
            "illustration", "photo", "diagram", "mockup", "banner", "thumbnail", "render",
        ];
        Self {
            structural_keywords: structural.iter().map(|s| s.to_string()).collect(),
            visual_keywords: visual.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A routing policy: backend pricing, tier mapping, budget and quality rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingPolicy {
    /// Version of this policy (semver-ish)
    pub policy_version: String,

    /// Human-readable name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Backend pricing profiles
    pub backends: Vec<BackendProfile>,

    #[serde(default)]
    pub routing: RoutingTable,

    #[serde(default)]
    pub budget: BudgetLimits,

    #[serde(default)]
    pub quality: QualityPolicy,

    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            policy_version: "1.0".to_string(),
            name: "default".to_string(),
            description: Some("Four-tier ladder from economy to frontier".to_string()),
            backends: vec![
                BackendProfile::new("economy", 0.25, 1.25, 4096, 1),
                BackendProfile::new("standard", 1.0, 5.0, 4096, 2),
                BackendProfile::new("premium", 3.0, 15.0, 8192, 3),
                BackendProfile::new("frontier", 15.0, 75.0, 8192, 4),
            ],
            routing: RoutingTable::default(),
            budget: BudgetLimits::default(),
            quality: QualityPolicy::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl RoutingPolicy {
    /// Parse a policy from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a policy from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a policy from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a policy from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a policy file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, PolicyError> {
        validate_policy_schema(&value).map_err(PolicyError::SchemaViolation)?;
        let policy: RoutingPolicy = serde_json::from_value(value)?;
        policy.validate()?;
        tracing::debug!(
            policy = %policy.name,
            version = %policy.policy_version,
            backends = policy.backends.len(),
            "Routing policy validated"
        );
        Ok(policy)
    }

    /// Semantic checks the schema cannot express.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.backends.is_empty() {
            return Err(PolicyError::Validation(
                "at least one backend is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.is_cached() {
                return Err(PolicyError::Validation(format!(
                    "backend id '{}' is reserved for cache deliveries",
                    backend.id
                )));
            }
            if !seen.insert(backend.id.as_str()) {
                return Err(PolicyError::Validation(format!(
                    "Duplicate backend id: {}",
                    backend.id
                )));
            }
            if backend.cost_per_million_input < 0.0 || backend.cost_per_million_output < 0.0 {
                return Err(PolicyError::Validation(format!(
                    "backend '{}' has negative pricing",
                    backend.id
                )));
            }
        }

        for id in [
            &self.routing.structural,
            &self.routing.visual,
            &self.routing.creative_premium,
            &self.routing.creative_default,
        ] {
            if !seen.contains(id.as_str()) {
                return Err(PolicyError::UnknownBackend(id.clone()));
            }
        }

        if !(0.0..=1.0).contains(&self.routing.premium_threshold) {
            return Err(PolicyError::Validation(
                "routing.premium_threshold must be within [0, 1]".to_string(),
            ));
        }

        let q = &self.quality;
        if q.rephrase.score > q.deliver.score || q.rephrase.grounding > q.deliver.grounding {
            return Err(PolicyError::Validation(
                "rephrase thresholds must not exceed deliver thresholds".to_string(),
            ));
        }
        let w = &q.weights;
        if w.relevance + w.coherence + w.toxicity + w.grounding <= 0.0 {
            return Err(PolicyError::Validation(
                "quality weights must not all be zero".to_string(),
            ));
        }

        let b = &self.budget;
        for (name, limit) in [
            ("per_request_ceiling_usd", b.per_request_ceiling_usd),
            ("hourly_limit_usd", b.hourly_limit_usd),
            ("daily_limit_usd", b.daily_limit_usd),
            ("monthly_limit_usd", b.monthly_limit_usd),
        ] {
            if limit.is_nan() || limit <= 0.0 {
                return Err(PolicyError::Validation(format!("budget.{} must be positive", name)));
            }
        }
        let t = &b.alert_thresholds;
        if !(t.warning <= t.critical && t.critical <= t.emergency) {
            return Err(PolicyError::Validation(
                "alert thresholds must be ordered warning <= critical <= emergency".to_string(),
            ));
        }

        Ok(())
    }

    /// Look up a backend profile by id.
    pub fn backend(&self, id: &str) -> Result<&BackendProfile, PolicyError> {
        self.backends
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| PolicyError::UnknownBackend(id.to_string()))
    }

    /// Whether a backend with this id is registered.
    pub fn has_backend(&self, id: &str) -> bool {
        self.backends.iter().any(|b| b.id == id)
    }

    /// Backends ordered cheapest tier first: the default escalation ladder.
    pub fn ladder(&self) -> Vec<&BackendProfile> {
        let mut ladder: Vec<&BackendProfile> = self.backends.iter().collect();
        ladder.sort_by(|a, b| a.tier_rank.cmp(&b.tier_rank).then_with(|| a.id.cmp(&b.id)));
        ladder
    }
}
