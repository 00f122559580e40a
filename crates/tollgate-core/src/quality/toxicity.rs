//! Toxicity detection.
//!
//! Reports a raw toxicity level in `[0, 1]` (higher is worse): the summed
//! severity of every offensive category found. The composite inverts it.

use super::patterns::TOXICITY_PATTERNS;
use super::{Dimension, Scorer, ScoringContext, SubScore};

/// Pattern-based toxicity scorer.
#[derive(Debug, Default, Clone)]
pub struct ToxicityScorer;

impl ToxicityScorer {
    pub fn new() -> Self {
        Self
    }
}

impl Scorer for ToxicityScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Toxicity
    }

    fn score(&self, output: &str, _ctx: &ScoringContext<'_>) -> SubScore {
        let mut toxicity: f64 = 0.0;
        let mut issues = Vec::new();

        for (category, severity, regex) in TOXICITY_PATTERNS.iter() {
            if regex.is_match(output) {
                toxicity += *severity;
                issues.push(format!("Contains {} language", category));
            }
        }

        let suggestions = if issues.is_empty() {
            Vec::new()
        } else {
            vec!["Remove hostile or offensive language".to_string()]
        };

        SubScore {
            dimension: Dimension::Toxicity,
            value: f64::min(toxicity, 1.0),
            issues,
            suggestions,
        }
    }
}
