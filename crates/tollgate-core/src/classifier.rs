//! Complexity Classifier
//!
//! Scores a task in `[0, 1]` and labels its shape. Pure and deterministic:
//! the same input text and flags always produce the same score.
//!
//! ## Score
//!
//! | Term | Weight |
//! |------|--------|
//! | length bucket | 0.1 .. 0.5 (five steps by character count) |
//! | structured output | +0.2 |
//! | requires reasoning | +0.3 |
//! | client facing | +0.15 |
//!
//! The sum is clamped to `[0, 1]`.
//!
//! ## Shape
//!
//! Keyword sets decide between `structural` and `visual`; anything else is
//! `creative`. The shape drives tier preference independently of the score.

use std::collections::HashSet;

use crate::policy::ClassifierConfig;
use crate::types::{ComplexityBand, ComplexityFactor, ComplexityScore, Task, TaskKind, TaskShape};

/// Upper bounds (exclusive, in characters) of the first four length buckets.
const LENGTH_BUCKETS: [(usize, f64); 4] = [(200, 0.1), (500, 0.2), (1000, 0.3), (2000, 0.4)];
const LONGEST_BUCKET: f64 = 0.5;

const STRUCTURED_WEIGHT: f64 = 0.2;
const REASONING_WEIGHT: f64 = 0.3;
const CLIENT_FACING_WEIGHT: f64 = 0.15;

/// Keyword-driven task classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Score and label a task.
    pub fn classify(&self, task: &Task) -> ComplexityScore {
        let mut factors = Vec::with_capacity(4);

        factors.push(ComplexityFactor {
            name: "length".to_string(),
            weight: length_bucket(task.input.chars().count()),
        });
        if task.flags.structured_output {
            factors.push(ComplexityFactor {
                name: "structured_output".to_string(),
                weight: STRUCTURED_WEIGHT,
            });
        }
        if task.flags.requires_reasoning {
            factors.push(ComplexityFactor {
                name: "requires_reasoning".to_string(),
                weight: REASONING_WEIGHT,
            });
        }
        if task.flags.client_facing {
            factors.push(ComplexityFactor {
                name: "client_facing".to_string(),
                weight: CLIENT_FACING_WEIGHT,
            });
        }

        let value = factors.iter().map(|f| f.weight).sum::<f64>().clamp(0.0, 1.0);

        ComplexityScore {
            value,
            band: ComplexityBand::from_score(value),
            shape: self.shape(task),
            contributing_factors: factors,
        }
    }

    /// Label the task by keyword hits.
    fn shape(&self, task: &Task) -> TaskShape {
        let text = task.input.to_lowercase();
        let words: HashSet<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut structural = count_hits(&text, &words, &self.config.structural_keywords);
        let visual = count_hits(&text, &words, &self.config.visual_keywords);

        // Classification, validation and compression are formatting-shaped work
        // regardless of vocabulary.
        if matches!(
            task.kind,
            TaskKind::Classification | TaskKind::Validation | TaskKind::Compression
        ) {
            structural += 1;
        }
        if task.flags.structured_output {
            structural += 1;
        }

        if structural > 0 && structural >= visual {
            TaskShape::Structural
        } else if visual > 0 {
            TaskShape::Visual
        } else {
            TaskShape::Creative
        }
    }
}

fn length_bucket(chars: usize) -> f64 {
    LENGTH_BUCKETS
        .iter()
        .find(|(limit, _)| chars < *limit)
        .map(|(_, weight)| *weight)
        .unwrap_or(LONGEST_BUCKET)
}

/// Single-word keywords match whole words; multi-word keywords match as
/// substrings of the lowercased text.
fn count_hits(text: &str, words: &HashSet<&str>, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|kw| {
            let kw = kw.to_lowercase();
            if kw.contains(' ') {
                text.contains(kw.as_str())
            } else {
                words.contains(kw.as_str())
            }
        })
        .count()
}
