//! Relevance: does the output talk about what was asked?
//!
//! Measured as the share of the input's content terms that reappear in the
//! output. Full marks do not require echoing every term; 50% coverage
//! already scores 1.0.

use super::patterns::content_terms;
use super::{Dimension, Scorer, ScoringContext, SubScore};

/// Score for inputs with no content terms to compare against.
const NEUTRAL: f64 = 0.75;
const FLOOR: f64 = 0.2;
const SLOPE: f64 = 1.6;
const LOW_RELEVANCE: f64 = 0.5;

/// Term-overlap relevance scorer.
#[derive(Debug, Default, Clone)]
pub struct RelevanceScorer;

impl RelevanceScorer {
    pub fn new() -> Self {
        Self
    }
}

impl Scorer for RelevanceScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Relevance
    }

    fn score(&self, output: &str, ctx: &ScoringContext<'_>) -> SubScore {
        if output.trim().is_empty() {
            let mut s = SubScore::clean(Dimension::Relevance, 0.0);
            s.issues.push("Output is empty".to_string());
            s.suggestions.push("Answer the request in full".to_string());
            return s;
        }

        let wanted = content_terms(&ctx.task.input);
        if wanted.is_empty() {
            return SubScore::clean(Dimension::Relevance, NEUTRAL);
        }

        let got = content_terms(output);
        let mut missing: Vec<&String> = wanted.iter().filter(|t| !got.contains(*t)).collect();
        let ratio = (wanted.len() - missing.len()) as f64 / wanted.len() as f64;
        let mut s = SubScore::clean(Dimension::Relevance, (FLOOR + SLOPE * ratio).min(1.0));

        if s.value < LOW_RELEVANCE {
            missing.sort();
            let topics: Vec<&str> = missing.iter().take(5).map(|t| t.as_str()).collect();
            s.issues
                .push("Output does not address most of the request".to_string());
            s.suggestions.push(format!(
                "Address the request directly, covering: {}",
                topics.join(", ")
            ));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Task, TaskKind};

    fn score(input: &str, output: &str) -> SubScore {
        let task = Task::new("t", TaskKind::Generation, input);
        let ctx = ScoringContext {
            task: &task,
            context: &[],
        };
        RelevanceScorer::new().score(output, &ctx)
    }

    #[test]
    fn test_on_topic_output() {
        let s = score(
            "Summarize the quarterly revenue report for investors",
            "The quarterly revenue report shows growth; investors should be pleased.",
        );
        assert_eq!(s.value, 1.0);
        assert!(s.issues.is_empty());
    }

    #[test]
    fn test_off_topic_output() {
        let s = score(
            "Summarize the quarterly revenue report for investors",
            "Bananas are yellow and grow in bunches.",
        );
        assert!((s.value - 0.2).abs() < 1e-9);
        assert_eq!(s.issues.len(), 1);
        assert!(s.suggestions[0].contains("quarterly"));
    }

    #[test]
    fn test_neutral_when_input_has_no_terms() {
        assert_eq!(score("Hi", "Hello there.").value, NEUTRAL);
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(score("Summarize the report", "   ").value, 0.0);
    }
}
