//! Routing recommendations derived from a [`LearningReport`].
//!
//! | Signal | Recommendation |
//! |--------|----------------|
//! | first attempts escalate often | lower the premium threshold |
//! | first attempts rarely escalate and mostly succeed | raise it |
//! | a backend's success rate is poor | demote that backend |
//! | rephrasing rarely recovers | prefer escalation over rephrase |

use serde::{Deserialize, Serialize};
use std::fmt;

use super::metrics::LearningReport;

pub const THRESHOLD_STEP: f64 = 0.05;
pub const THRESHOLD_MIN: f64 = 0.5;
pub const THRESHOLD_MAX: f64 = 0.9;

const HIGH_FIRST_ESCALATION: f64 = 0.3;
const LOW_FIRST_ESCALATION: f64 = 0.05;
const HEALTHY_SUCCESS: f64 = 0.9;
const POOR_BACKEND_SUCCESS: f64 = 0.5;
const MIN_BACKEND_ATTEMPTS: u64 = 5;
const POOR_RECOVERY: f64 = 0.3;
const MIN_REPHRASE_SAMPLES: usize = 5;

/// A suggested routing change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recommendation {
    AdjustPremiumThreshold { from: f64, to: f64 },
    DemoteBackend { backend_id: String, success_rate: f64 },
    PreferEscalation { recovery_rate: f64 },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::AdjustPremiumThreshold { from, to } => {
                write!(f, "adjust premium threshold {:.2} -> {:.2}", from, to)
            }
            Recommendation::DemoteBackend {
                backend_id,
                success_rate,
            } => write!(
                f,
                "demote backend '{}' (success rate {:.0}%)",
                backend_id,
                success_rate * 100.0
            ),
            Recommendation::PreferEscalation { recovery_rate } => write!(
                f,
                "prefer escalation over rephrase (recovery rate {:.0}%)",
                recovery_rate * 100.0
            ),
        }
    }
}

/// Recommendations for a report, given the live premium threshold.
///
/// Nothing is recommended until `min_samples` attempts have been seen.
pub fn recommend(report: &LearningReport, premium_threshold: f64, min_samples: usize) -> Vec<Recommendation> {
    if report.attempts < min_samples {
        return Vec::new();
    }
    let mut out = Vec::new();

    let target = if report.first_attempt_escalation_rate > HIGH_FIRST_ESCALATION {
        Some(premium_threshold - THRESHOLD_STEP)
    } else if report.first_attempt_escalation_rate < LOW_FIRST_ESCALATION
        && report.success_rate > HEALTHY_SUCCESS
    {
        Some(premium_threshold + THRESHOLD_STEP)
    } else {
        None
    };
    if let Some(to) = target.map(|t| t.clamp(THRESHOLD_MIN, THRESHOLD_MAX)) {
        if (to - premium_threshold).abs() > f64::EPSILON {
            out.push(Recommendation::AdjustPremiumThreshold {
                from: premium_threshold,
                to,
            });
        }
    }

    for backend in &report.backends {
        if backend.attempts >= MIN_BACKEND_ATTEMPTS && backend.success_rate() < POOR_BACKEND_SUCCESS {
            out.push(Recommendation::DemoteBackend {
                backend_id: backend.backend_id.clone(),
                success_rate: backend.success_rate(),
            });
        }
    }

    if let Some(rate) = report.rephrase_recovery_rate {
        if report.rephrase_samples >= MIN_REPHRASE_SAMPLES && rate < POOR_RECOVERY {
            out.push(Recommendation::PreferEscalation { recovery_rate: rate });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::metrics::summarize;
    use tollgate_core::{AttemptRecord, Verdict};

    fn rec(task: usize, n: u32, backend: &str, score: f64, verdict: Verdict) -> AttemptRecord {
        AttemptRecord {
            task_id: format!("t{}", task),
            attempt_number: n,
            backend_id: backend.to_string(),
            quality_score: score,
            verdict,
            cost_usd: 0.01,
            backend_failed: false,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_too_few_samples() {
        let records: Vec<_> = (0..5).map(|i| rec(i, 1, "economy", 0.2, Verdict::Escalate)).collect();
        assert!(recommend(&summarize(&records, 0.8), 0.7, 20).is_empty());
    }

    #[test]
    fn test_frequent_escalation_lowers_threshold_and_demotes() {
        let records: Vec<_> = (0..20)
            .map(|i| rec(i, 1, "economy", 0.3, Verdict::Escalate))
            .collect();
        let recs = recommend(&summarize(&records, 0.8), 0.7, 20);
        assert!(recs.contains(&Recommendation::AdjustPremiumThreshold { from: 0.7, to: 0.65 }));
        assert!(recs
            .iter()
            .any(|r| matches!(r, Recommendation::DemoteBackend { backend_id, .. } if backend_id == "economy")));
    }

    #[test]
    fn test_healthy_traffic_raises_threshold_within_bounds() {
        let records: Vec<_> = (0..20).map(|i| rec(i, 1, "economy", 0.95, Verdict::Deliver)).collect();
        let report = summarize(&records, 0.8);
        assert_eq!(
            recommend(&report, 0.7, 20),
            vec![Recommendation::AdjustPremiumThreshold { from: 0.7, to: 0.75 }]
        );
        assert!(recommend(&report, 0.9, 20).is_empty());
    }

    #[test]
    fn test_poor_rephrase_recovery() {
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(rec(i, 1, "standard", 0.65, Verdict::Rephrase));
            records.push(rec(i, 2, "standard", 0.85, Verdict::Deliver));
        }
        for i in 10..16 {
            records.push(rec(i, 1, "standard", 0.65, Verdict::Rephrase));
            records.push(rec(i, 2, "standard", 0.62, Verdict::Rephrase));
            records.push(rec(i, 3, "standard", 0.61, Verdict::Rephrase));
        }
        let report = summarize(&records, 0.8);
        // 10 of 22 rephrases recovered
        assert!(report.rephrase_recovery_rate.unwrap() > POOR_RECOVERY);
        assert!(!recommend(&report, 0.7, 20)
            .iter()
            .any(|r| matches!(r, Recommendation::PreferEscalation { .. })));

        let stuck: Vec<_> = (0..12)
            .flat_map(|i| {
                vec![
                    rec(i, 1, "standard", 0.65, Verdict::Rephrase),
                    rec(i, 2, "standard", 0.62, Verdict::Escalate),
                ]
            })
            .collect();
        let recs = recommend(&summarize(&stuck, 0.8), 0.7, 20);
        assert!(recs.contains(&Recommendation::PreferEscalation { recovery_rate: 0.0 }));
    }
}
