//! # tollgate-core
//!
//! Deterministic building blocks of a cost-governed request router.
//!
//! This crate answers, without any I/O:
//! - How hard is this task, and what shape is it?
//! - Which backend should try it first?
//! - What will an attempt cost?
//! - Is this output good enough to deliver?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same task and policy always classify and price the same
//! 2. **No backend calls**: scoring here is rule-based; grounding verification
//!    that needs a backend lives in `tollgate-runtime`
//! 3. **Validated configuration**: policies are schema-checked and cross-checked
//!    when loaded, never per request
//!
//! ## Example
//!
//! ```rust,ignore
//! use tollgate_core::{classify, RoutingPolicy, Task, TaskKind, select_initial, estimate_attempt};
//!
//! let policy = RoutingPolicy::from_yaml_file("policy.yaml")?;
//! let task = Task::new("t-1", TaskKind::Generation, "Convert this table to JSON");
//! let score = classify(&task);
//! let (backend, _) = select_initial(&policy, &score, &task, policy.routing.premium_threshold)?;
//! let estimate = estimate_attempt(backend, &task, &task.input);
//! println!("{} via {} for ${:.4}", score.shape, backend.id, estimate.cost_usd);
//! ```

pub mod classifier;
pub mod clock;
pub mod cost;
pub mod fingerprint;
pub mod policy;
pub mod quality;
pub mod selection;
pub mod types;

// Re-export main types at crate root
pub use classifier::Classifier;
pub use clock::{Clock, ManualClock, SystemClock};
pub use cost::{effective_max_tokens, estimate_attempt, estimate_cost, estimate_tokens, CostEstimate};
pub use fingerprint::{cache_key, fingerprint};
pub use policy::{
    AlertThresholds, BrandRules, BudgetLimits, ClassifierConfig, GateThreshold, PolicyError,
    QualityPolicy, QualityWeights, RoutingPolicy, RoutingTable,
};
pub use quality::{
    assess, composite, default_scorers, extract_claims, is_supported_lexically, verdict,
    Assessment, Claim, Dimension, Scorer, ScoringContext, SubScore,
};
pub use selection::{select_initial, SelectionReason};
pub use types::{
    AttemptRecord, BackendProfile, ComplexityBand, ComplexityFactor, ComplexityScore, Task,
    TaskFlags, TaskKind, TaskShape, Verdict, CACHED_BACKEND_ID,
};

/// Classify a task with the built-in keyword sets.
///
/// Use [`Classifier::new`] with a policy's `classifier` section to apply
/// custom keywords.
pub fn classify(task: &Task) -> ComplexityScore {
    Classifier::default().classify(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_structural_task() {
        let policy = RoutingPolicy::default();
        let task = Task::new("t-1", TaskKind::Generation, "Convert this table to JSON");
        let score = classify(&task);
        let (backend, reason) =
            select_initial(&policy, &score, &task, policy.routing.premium_threshold).unwrap();

        assert_eq!(score.shape, TaskShape::Structural);
        assert_eq!(backend.id, "economy");
        assert_eq!(reason, SelectionReason::Structural);

        let estimate = estimate_attempt(backend, &task, &task.input);
        assert!(estimate.cost_usd > 0.0);
        assert!(estimate.cost_usd < policy.budget.per_request_ceiling_usd);
    }

    #[test]
    fn test_default_scorers_cover_static_dimensions() {
        let policy = RoutingPolicy::default();
        let scorers = default_scorers(&policy.quality);
        let dims: Vec<Dimension> = scorers.iter().map(|s| s.dimension()).collect();
        assert_eq!(
            dims,
            vec![
                Dimension::Relevance,
                Dimension::Coherence,
                Dimension::Brand,
                Dimension::Toxicity
            ]
        );
    }
}
