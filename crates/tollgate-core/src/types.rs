//! Core types for tollgate routing.
//!
//! These types are shared between the deterministic core and the async
//! runtime. Everything here is plain data: no I/O, no clocks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend id reported for deliveries served from the response cache.
pub const CACHED_BACKEND_ID: &str = "cached";

/// What kind of work a task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Generation,
    Classification,
    Validation,
    Compression,
    Reasoning,
}

impl TaskKind {
    /// Stable lowercase name, used in fingerprints and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Generation => "generation",
            TaskKind::Classification => "classification",
            TaskKind::Validation => "validation",
            TaskKind::Compression => "compression",
            TaskKind::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generation" => Ok(Self::Generation),
            "classification" => Ok(Self::Classification),
            "validation" => Ok(Self::Validation),
            "compression" => Ok(Self::Compression),
            "reasoning" => Ok(Self::Reasoning),
            _ => Err(format!(
                "invalid task kind '{}', expected: generation, classification, validation, compression, reasoning",
                s
            )),
        }
    }
}

/// Behavioral flags attached to a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskFlags {
    /// Output is shown to an end client
    pub client_facing: bool,

    /// Output is a final deliverable rather than an intermediate step
    pub final_deliverable: bool,

    /// Output must be machine-readable (JSON)
    pub structured_output: bool,

    /// Task needs multi-step reasoning
    pub requires_reasoning: bool,
}

impl TaskFlags {
    /// Whether brand/style conformance should weigh into the quality score.
    pub fn brand_sensitive(&self) -> bool {
        self.client_facing || self.final_deliverable
    }
}

/// A unit of work submitted to the router.
///
/// Tasks are immutable once submitted; the router derives attempt prompts
/// from them without modifying the task itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-supplied identifier
    pub id: String,

    /// Kind of work
    pub kind: TaskKind,

    /// The input text (prompt body)
    pub input: String,

    /// Optional system prompt passed through to the backend
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Prior context the output must stay grounded in
    #[serde(default)]
    pub context_history: Vec<String>,

    /// Behavioral flags
    #[serde(default)]
    pub flags: TaskFlags,

    /// Maximum spend for a single attempt of this task, in USD
    #[serde(default)]
    pub budget_ceiling_usd: Option<f64>,

    /// Maximum output tokens for any attempt
    #[serde(default)]
    pub token_ceiling: Option<u32>,

    /// Explicit cache key; a fingerprint is derived when absent
    #[serde(default)]
    pub cache_key: Option<String>,

    /// Bypass the cache lookup for this task
    #[serde(default)]
    pub skip_cache: bool,

    /// Pin the initial backend
    #[serde(default)]
    pub forced_backend: Option<String>,

    /// Backends to try, in order, when a backend call fails
    #[serde(default)]
    pub fallback_backends: Vec<String>,
}

impl Task {
    /// Create a task with default flags and no ceilings.
    pub fn new(id: impl Into<String>, kind: TaskKind, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            input: input.into(),
            system_prompt: None,
            context_history: Vec::new(),
            flags: TaskFlags::default(),
            budget_ceiling_usd: None,
            token_ceiling: None,
            cache_key: None,
            skip_cache: false,
            forced_backend: None,
            fallback_backends: Vec::new(),
        }
    }

    /// Set the flags.
    pub fn with_flags(mut self, flags: TaskFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the grounding context.
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context_history = context;
        self
    }

    /// Set an explicit cache key.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Set the per-attempt budget ceiling.
    pub fn with_budget_ceiling(mut self, usd: f64) -> Self {
        self.budget_ceiling_usd = Some(usd);
        self
    }

    /// Set the output token ceiling.
    pub fn with_token_ceiling(mut self, tokens: u32) -> Self {
        self.token_ceiling = Some(tokens);
        self
    }

    /// Pin the initial backend.
    pub fn with_forced_backend(mut self, backend: impl Into<String>) -> Self {
        self.forced_backend = Some(backend.into());
        self
    }

    /// Set the explicit failover list.
    pub fn with_fallbacks(mut self, backends: Vec<String>) -> Self {
        self.fallback_backends = backends;
        self
    }

    /// Bypass the cache lookup.
    pub fn skipping_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }
}

/// Coarse band of the numeric complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityBand {
    Simple,
    Medium,
    High,
}

impl ComplexityBand {
    /// Band for a score in `[0, 1]`.
    pub fn from_score(value: f64) -> Self {
        if value >= 0.7 {
            ComplexityBand::High
        } else if value >= 0.4 {
            ComplexityBand::Medium
        } else {
            ComplexityBand::Simple
        }
    }
}

/// Shape of the work, independent of the numeric score.
///
/// The shape drives tier preference: structural work goes to the cheapest
/// tier, visual work to the mid tier, creative work to premium when hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskShape {
    Structural,
    Visual,
    Creative,
}

impl fmt::Display for TaskShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskShape::Structural => write!(f, "structural"),
            TaskShape::Visual => write!(f, "visual"),
            TaskShape::Creative => write!(f, "creative"),
        }
    }
}

/// One term contributing to a complexity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFactor {
    pub name: String,
    pub weight: f64,
}

/// Result of classifying a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    /// Score in `[0, 1]`
    pub value: f64,

    /// Band of `value`
    pub band: ComplexityBand,

    /// Keyword-derived shape
    pub shape: TaskShape,

    /// Terms that were summed into `value`
    pub contributing_factors: Vec<ComplexityFactor>,
}

/// Static pricing and capability profile of a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    /// Unique backend id
    pub id: String,

    /// USD per million input tokens
    pub cost_per_million_input: f64,

    /// USD per million output tokens
    pub cost_per_million_output: f64,

    /// Maximum output tokens the backend accepts
    pub max_tokens: u32,

    /// Position on the escalation ladder (lower is cheaper)
    pub tier_rank: u32,
}

impl BackendProfile {
    /// Create a profile.
    pub fn new(
        id: impl Into<String>,
        cost_per_million_input: f64,
        cost_per_million_output: f64,
        max_tokens: u32,
        tier_rank: u32,
    ) -> Self {
        Self {
            id: id.into(),
            cost_per_million_input,
            cost_per_million_output,
            max_tokens,
            tier_rank,
        }
    }

    /// The zero-cost tier used for cache deliveries.
    pub fn cached() -> Self {
        Self::new(CACHED_BACKEND_ID, 0.0, 0.0, u32::MAX, 0)
    }

    /// Whether this is the zero-cost cached tier.
    pub fn is_cached(&self) -> bool {
        self.id == CACHED_BACKEND_ID
    }
}

/// Action the quality gate asks the router to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Deliver,
    Rephrase,
    Escalate,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Deliver => write!(f, "deliver"),
            Verdict::Rephrase => write!(f, "rephrase"),
            Verdict::Escalate => write!(f, "escalate"),
        }
    }
}

/// One router attempt, as consumed by the learning loop.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub task_id: String,

    /// 1-based attempt number within the task
    pub attempt_number: u32,

    pub backend_id: String,

    /// Composite gate score (0.0 when the backend call failed)
    pub quality_score: f64,

    pub verdict: Verdict,

    /// Cost actually incurred by this attempt
    pub cost_usd: f64,

    /// Whether the backend call itself failed (transport, timeout)
    #[serde(default)]
    pub backend_failed: bool,

    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(ComplexityBand::from_score(0.0), ComplexityBand::Simple);
        assert_eq!(ComplexityBand::from_score(0.39), ComplexityBand::Simple);
        assert_eq!(ComplexityBand::from_score(0.4), ComplexityBand::Medium);
        assert_eq!(ComplexityBand::from_score(0.7), ComplexityBand::High);
        assert_eq!(ComplexityBand::from_score(1.0), ComplexityBand::High);
    }

    #[test]
    fn test_brand_sensitivity() {
        let mut flags = TaskFlags::default();
        assert!(!flags.brand_sensitive());
        flags.final_deliverable = true;
        assert!(flags.brand_sensitive());
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: Task = serde_json::from_str(
            r#"{"id": "t1", "kind": "generation", "input": "Write a tagline"}"#,
        )
        .unwrap();
        assert_eq!(task.kind, TaskKind::Generation);
        assert!(!task.skip_cache);
        assert!(task.context_history.is_empty());
        assert!(!task.flags.client_facing);
    }

    #[test]
    fn test_task_kind_parse() {
        assert_eq!("Reasoning".parse::<TaskKind>().unwrap(), TaskKind::Reasoning);
        assert!("poetry".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_cached_profile_is_free() {
        let cached = BackendProfile::cached();
        assert!(cached.is_cached());
        assert_eq!(cached.cost_per_million_input, 0.0);
        assert_eq!(cached.cost_per_million_output, 0.0);
    }
}
