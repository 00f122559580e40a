//! Brand and style conformance.
//!
//! Starts from a neutral-good baseline, penalizes banned vocabulary and an
//! off-brand tone (exclamation spam, shouting, slang), and gives a small
//! bonus for preferred vocabulary.

use super::patterns::{contains_slang, shouting_count};
use super::{Dimension, Scorer, ScoringContext, SubScore};
use crate::policy::BrandRules;

const BASELINE: f64 = 0.85;
const BANNED_PENALTY: f64 = 0.25;
const PREFERRED_BONUS: f64 = 0.05;
const TONE_PENALTY: f64 = 0.1;
const MAX_EXCLAMATIONS: usize = 2;
const MAX_SHOUTED_WORDS: usize = 2;

/// Keyword allow/deny list plus tone heuristics.
#[derive(Debug, Clone, Default)]
pub struct BrandScorer {
    rules: BrandRules,
}

impl BrandScorer {
    pub fn new(rules: BrandRules) -> Self {
        Self { rules }
    }
}

impl Scorer for BrandScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Brand
    }

    fn score(&self, output: &str, _ctx: &ScoringContext<'_>) -> SubScore {
        let lowered = output.to_lowercase();
        let mut value = BASELINE;
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        for term in &self.rules.banned {
            if lowered.contains(&term.to_lowercase()) {
                value -= BANNED_PENALTY;
                issues.push(format!("Uses banned term '{}'", term));
                suggestions.push(format!("Do not use the word '{}'", term));
            }
        }

        let preferred = self
            .rules
            .preferred
            .iter()
            .filter(|t| lowered.contains(&t.to_lowercase()))
            .count();
        value += PREFERRED_BONUS * preferred as f64;

        if output.matches('!').count() > MAX_EXCLAMATIONS {
            value -= TONE_PENALTY;
            issues.push("Too many exclamation marks".to_string());
            suggestions.push("Use a calmer, professional tone".to_string());
        }
        if shouting_count(output) > MAX_SHOUTED_WORDS {
            value -= TONE_PENALTY;
            issues.push("Uses all-caps shouting".to_string());
            suggestions.push("Avoid writing words in all caps".to_string());
        }
        if contains_slang(output) {
            value -= TONE_PENALTY;
            issues.push("Uses casual slang".to_string());
            suggestions.push("Replace slang with plain professional language".to_string());
        }

        SubScore {
            dimension: Dimension::Brand,
            value: value.clamp(0.0, 1.0),
            issues,
            suggestions,
        }
    }
}
