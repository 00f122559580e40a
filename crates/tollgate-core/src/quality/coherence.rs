//! Coherence: is the output well-formed?
//!
//! Structured-output tasks must parse as JSON. Prose is checked for
//! completeness, a reasonable length, capitalization and repetition.

use std::collections::HashSet;

use super::claims::split_sentences;
use super::{Dimension, Scorer, ScoringContext, SubScore};

const MIN_PROSE_CHARS: usize = 20;
const INVALID_JSON: f64 = 0.3;

/// Structural coherence scorer.
#[derive(Debug, Default, Clone)]
pub struct CoherenceScorer;

impl CoherenceScorer {
    pub fn new() -> Self {
        Self
    }

    fn score_json(&self, output: &str) -> SubScore {
        let body = strip_code_fence(output);
        if serde_json::from_str::<serde_json::Value>(body).is_ok() {
            return SubScore::clean(Dimension::Coherence, 1.0);
        }
        let mut s = SubScore::clean(Dimension::Coherence, INVALID_JSON);
        s.issues.push("Output is not valid JSON".to_string());
        s.suggestions
            .push("Return only valid JSON with no surrounding prose".to_string());
        s
    }

    fn score_prose(&self, output: &str) -> SubScore {
        let text = output.trim();
        if text.is_empty() {
            let mut s = SubScore::clean(Dimension::Coherence, 0.0);
            s.issues.push("Output is empty".to_string());
            return s;
        }

        let mut value = 1.0;
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        if text.chars().count() < MIN_PROSE_CHARS {
            value -= 0.3;
            issues.push("Output is very short".to_string());
            suggestions.push("Give a complete answer".to_string());
        }

        let ends_cleanly = text
            .chars()
            .last()
            .map(|c| ".!?\"')]`*:".contains(c))
            .unwrap_or(false);
        if !ends_cleanly {
            value -= 0.2;
            issues.push("Output ends mid-sentence".to_string());
            suggestions.push("Finish every sentence".to_string());
        }

        let starts_lowercase = text
            .chars()
            .find(|c| c.is_alphabetic())
            .map(|c| c.is_lowercase())
            .unwrap_or(false);
        if starts_lowercase {
            value -= 0.1;
            issues.push("Output does not start with a capital letter".to_string());
        }

        let mut seen = HashSet::new();
        let repeated = split_sentences(text)
            .into_iter()
            .map(|(s, _, _)| s.to_lowercase())
            .filter(|s| s.len() > 10)
            .any(|s| !seen.insert(s));
        if repeated {
            value -= 0.2;
            issues.push("Output repeats itself".to_string());
            suggestions.push("Remove repeated sentences".to_string());
        }

        SubScore {
            dimension: Dimension::Coherence,
            value: f64::max(value, 0.0),
            issues,
            suggestions,
        }
    }
}

impl Scorer for CoherenceScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Coherence
    }

    fn score(&self, output: &str, ctx: &ScoringContext<'_>) -> SubScore {
        if ctx.task.flags.structured_output {
            self.score_json(output)
        } else {
            self.score_prose(output)
        }
    }
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Task, TaskFlags, TaskKind};

    fn score(output: &str, structured: bool) -> SubScore {
        let task = Task::new("t", TaskKind::Generation, "input").with_flags(TaskFlags {
            structured_output: structured,
            ..Default::default()
        });
        let ctx = ScoringContext {
            task: &task,
            context: &[],
        };
        CoherenceScorer::new().score(output, &ctx)
    }

    #[test]
    fn test_clean_prose() {
        let s = score("The launch went well. Customers liked the new colors.", false);
        assert_eq!(s.value, 1.0);
        assert!(s.issues.is_empty());
    }

    #[test]
    fn test_truncated_prose() {
        let s = score("The launch went well and customers liked the", false);
        assert!((s.value - 0.8).abs() < 1e-9);
        assert_eq!(s.issues, vec!["Output ends mid-sentence".to_string()]);
    }

    #[test]
    fn test_lowercase_and_short() {
        let s = score("ok then.", false);
        assert!((s.value - 0.6).abs() < 1e-9);
        assert_eq!(s.issues.len(), 2);
    }

    #[test]
    fn test_repetition() {
        let s = score("Our product is great. Our product is great.", false);
        assert!((s.value - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_json_output() {
        assert_eq!(score(r#"{"name": "tollgate"}"#, true).value, 1.0);
        assert_eq!(score("```json\n{\"a\": 1}\n```", true).value, 1.0);
        assert_eq!(score("Here you go: {\"a\": 1}", true).value, INVALID_JSON);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  [1] "), "[1]");
    }
}
