//! Deterministic quality scoring.
//!
//! Each dimension of output quality is scored by an independent [`Scorer`].
//! The sub-scores are combined with the policy's weights into a composite,
//! and the composite plus the grounding score decide the [`Verdict`].
//!
//! ## Dimensions
//!
//! | Dimension | Direction | Weighted when |
//! |-----------|-----------|---------------|
//! | relevance | higher is better | always |
//! | coherence | higher is better | always |
//! | brand | higher is better | always (raised weight for brand-sensitive tasks) |
//! | toxicity | **higher is worse**, inverted in the composite | always |
//! | grounding | higher is better | always |
//!
//! Grounding needs claim verification, which may call a backend, so it is
//! computed by the runtime and passed in as a ready [`SubScore`]. This crate
//! provides claim extraction for it in [`claims`].

pub mod claims;
mod coherence;
mod brand;
pub mod patterns;
mod relevance;
mod toxicity;

pub use brand::BrandScorer;
pub use claims::{extract_claims, is_supported_lexically, Claim};
pub use coherence::CoherenceScorer;
pub use relevance::RelevanceScorer;
pub use toxicity::ToxicityScorer;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::policy::QualityPolicy;
use crate::types::{Task, Verdict};

/// A quality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Relevance,
    Coherence,
    Brand,
    Toxicity,
    Grounding,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Relevance => write!(f, "relevance"),
            Dimension::Coherence => write!(f, "coherence"),
            Dimension::Brand => write!(f, "brand"),
            Dimension::Toxicity => write!(f, "toxicity"),
            Dimension::Grounding => write!(f, "grounding"),
        }
    }
}

/// What a scorer sees besides the output itself.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub task: &'a Task,
    pub context: &'a [String],
}

/// One dimension's score plus what went wrong and how to fix it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub dimension: Dimension,

    /// Raw value in `[0, 1]`; for toxicity, higher is worse
    pub value: f64,

    #[serde(default)]
    pub issues: Vec<String>,

    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl SubScore {
    /// A score with no findings.
    pub fn clean(dimension: Dimension, value: f64) -> Self {
        Self {
            dimension,
            value: value.clamp(0.0, 1.0),
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Value oriented so that higher is always better.
    pub fn normalized(&self) -> f64 {
        match self.dimension {
            Dimension::Toxicity => 1.0 - self.value,
            _ => self.value,
        }
    }
}

/// A pluggable, deterministic quality scorer.
///
/// Implementations must be pure: same output and context, same score.
pub trait Scorer: Send + Sync {
    /// The dimension this scorer reports.
    fn dimension(&self) -> Dimension;

    /// Score an output.
    fn score(&self, output: &str, ctx: &ScoringContext<'_>) -> SubScore;
}

/// The built-in heuristic scorers for every dimension except grounding.
pub fn default_scorers(policy: &QualityPolicy) -> Vec<Box<dyn Scorer>> {
    vec![
        Box::new(RelevanceScorer::new()),
        Box::new(CoherenceScorer::new()),
        Box::new(BrandScorer::new(policy.brand.clone())),
        Box::new(ToxicityScorer::new()),
    ]
}

/// Weight of a dimension for a task.
pub fn weight_for(policy: &QualityPolicy, dimension: Dimension, brand_sensitive: bool) -> f64 {
    let w = &policy.weights;
    match dimension {
        Dimension::Relevance => w.relevance,
        Dimension::Coherence => w.coherence,
        Dimension::Brand if brand_sensitive => w.brand_sensitive_brand,
        Dimension::Brand => w.brand,
        Dimension::Toxicity => w.toxicity,
        Dimension::Grounding => w.grounding,
    }
}

/// Weighted mean of the normalized sub-scores.
pub fn composite(policy: &QualityPolicy, scores: &[SubScore], brand_sensitive: bool) -> f64 {
    let (sum, total) = scores.iter().fold((0.0, 0.0), |(sum, total), s| {
        let w = weight_for(policy, s.dimension, brand_sensitive);
        (sum + w * s.normalized(), total + w)
    });

    if total <= 0.0 {
        0.0
    } else {
        (sum / total).clamp(0.0, 1.0)
    }
}

/// Gate thresholds applied to a composite and a grounding score.
///
/// `deliver` needs both deliver thresholds met, `rephrase` both rephrase
/// thresholds; anything else escalates.
pub fn verdict(policy: &QualityPolicy, score: f64, grounding: f64) -> Verdict {
    if score >= policy.deliver.score && grounding >= policy.deliver.grounding {
        Verdict::Deliver
    } else if score >= policy.rephrase.score && grounding >= policy.rephrase.grounding {
        Verdict::Rephrase
    } else {
        Verdict::Escalate
    }
}

/// The combined outcome of scoring one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Composite score in `[0, 1]`
    pub score: f64,

    /// Grounding sub-score (1.0 when nothing was checked)
    pub grounding: f64,

    pub verdict: Verdict,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub sub_scores: Vec<SubScore>,
}

/// Combine sub-scores (including grounding, if present) into an assessment.
pub fn assess(policy: &QualityPolicy, task: &Task, sub_scores: Vec<SubScore>) -> Assessment {
    let brand_sensitive = task.flags.brand_sensitive();
    let score = composite(policy, &sub_scores, brand_sensitive);
    let grounding = sub_scores
        .iter()
        .find(|s| s.dimension == Dimension::Grounding)
        .map(|s| s.value)
        .unwrap_or(1.0);

    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    for s in &sub_scores {
        // Brand findings only matter when brand is actually weighted.
        if weight_for(policy, s.dimension, brand_sensitive) <= 0.0 {
            continue;
        }
        issues.extend(s.issues.iter().cloned());
        for suggestion in &s.suggestions {
            if !suggestions.contains(suggestion) {
                suggestions.push(suggestion.clone());
            }
        }
    }

    Assessment {
        score,
        grounding,
        verdict: verdict(policy, score, grounding),
        issues,
        suggestions,
        sub_scores,
    }
}

/// Run every scorer over an output.
pub fn score_all(scorers: &[Box<dyn Scorer>], output: &str, ctx: &ScoringContext<'_>) -> Vec<SubScore> {
    scorers.iter().map(|s| s.score(output, ctx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskFlags, TaskKind};

    fn sub(dimension: Dimension, value: f64) -> SubScore {
        SubScore::clean(dimension, value)
    }

    #[test]
    fn test_verdict_thresholds() {
        let policy = QualityPolicy::default();
        assert_eq!(verdict(&policy, 0.85, 0.8), Verdict::Deliver);
        assert_eq!(verdict(&policy, 0.8, 0.7), Verdict::Deliver);
        assert_eq!(verdict(&policy, 0.65, 0.55), Verdict::Rephrase);
        assert_eq!(verdict(&policy, 0.9, 0.6), Verdict::Rephrase);
        assert_eq!(verdict(&policy, 0.9, 0.4), Verdict::Escalate);
        assert_eq!(verdict(&policy, 0.59, 1.0), Verdict::Escalate);
    }

    #[test]
    fn test_toxicity_is_inverted() {
        let policy = QualityPolicy::default();
        let clean = composite(&policy, &[sub(Dimension::Toxicity, 0.0)], false);
        let toxic = composite(&policy, &[sub(Dimension::Toxicity, 1.0)], false);
        assert_eq!(clean, 1.0);
        assert_eq!(toxic, 0.0);
    }

    #[test]
    fn test_brand_weighted_only_when_sensitive() {
        let policy = QualityPolicy::default();
        let scores = vec![sub(Dimension::Relevance, 1.0), sub(Dimension::Brand, 0.0)];
        assert_eq!(composite(&policy, &scores, false), 1.0);

        let sensitive = composite(&policy, &scores, true);
        assert!((sensitive - 0.3 / 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_assess_collects_findings() {
        let policy = QualityPolicy::default();
        let task = Task::new("t", TaskKind::Generation, "x");
        let mut brand = sub(Dimension::Brand, 0.2);
        brand.issues.push("banned".into());
        let mut relevance = sub(Dimension::Relevance, 0.5);
        relevance.issues.push("off topic".into());
        relevance.suggestions.push("stay on topic".into());

        let a = assess(&policy, &task, vec![relevance, brand, sub(Dimension::Grounding, 0.9)]);
        assert_eq!(a.issues, vec!["off topic".to_string()]);
        assert_eq!(a.suggestions, vec!["stay on topic".to_string()]);
        assert_eq!(a.grounding, 0.9);

        let task = task.with_flags(TaskFlags {
            client_facing: true,
            ..Default::default()
        });
        let mut brand = sub(Dimension::Brand, 0.2);
        brand.issues.push("banned".into());
        let a = assess(&policy, &task, vec![brand]);
        assert_eq!(a.issues, vec!["banned".to_string()]);
        assert_eq!(a.grounding, 1.0);
    }
}
