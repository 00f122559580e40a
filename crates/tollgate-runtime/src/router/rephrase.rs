//! Prompt rewriting for the rephrase path.

use crate::gate::GateReport;
use crate::prompts::{correction_block, CORRECTION_HEADER};

/// Rewrites a prompt after the gate asked for a rephrase.
pub trait RephraseStrategy: Send + Sync {
    fn rephrase(&self, prompt: &str, report: &GateReport) -> String;

    fn name(&self) -> &str;
}

/// Appends a corrective block listing the gate's issues and suggestions.
///
/// A block from an earlier rephrase is replaced rather than stacked.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendCorrections;

impl RephraseStrategy for AppendCorrections {
    fn rephrase(&self, prompt: &str, report: &GateReport) -> String {
        let marker = format!("\n\n{}", CORRECTION_HEADER);
        let base = match prompt.find(&marker) {
            Some(at) => &prompt[..at],
            None => prompt,
        };
        let assessment = &report.assessment;
        format!(
            "{}{}",
            base,
            correction_block(&assessment.issues, &assessment.suggestions)
        )
    }

    fn name(&self) -> &str {
        "append_corrections"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::GroundingReport;
    use tollgate_core::{Assessment, Verdict};

    fn report(issues: &[&str], suggestions: &[&str]) -> GateReport {
        GateReport {
            assessment: Assessment {
                score: 0.65,
                grounding: 0.55,
                verdict: Verdict::Rephrase,
                issues: issues.iter().map(|s| s.to_string()).collect(),
                suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
                sub_scores: Vec::new(),
            },
            grounding: GroundingReport {
                score: 0.55,
                findings: Vec::new(),
                cost_usd: 0.0,
                skipped: false,
            },
        }
    }

    #[test]
    fn test_appends_findings() {
        let out = AppendCorrections.rephrase(
            "Summarize the quarter",
            &report(&["Answer is off topic"], &["Address the quarter directly"]),
        );
        assert!(out.starts_with("Summarize the quarter\n\n## Revision required"));
        assert!(out.contains("- Problem: Answer is off topic"));
        assert!(out.contains("- Fix: Address the quarter directly"));
    }

    #[test]
    fn test_replaces_previous_block() {
        let strategy = AppendCorrections;
        let first = strategy.rephrase("Summarize", &report(&["first issue"], &[]));
        let second = strategy.rephrase(&first, &report(&["second issue"], &[]));
        assert_eq!(second.matches(CORRECTION_HEADER).count(), 1);
        assert!(!second.contains("first issue"));
        assert!(second.contains("second issue"));
    }
}
