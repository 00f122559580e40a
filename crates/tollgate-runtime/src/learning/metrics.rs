//! Aggregates over the attempt log.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tollgate_core::{AttemptRecord, Verdict};

/// Smoothing factor for the per-backend quality average.
const EMA_ALPHA: f64 = 0.2;

/// Running figures for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendMetric {
    pub backend_id: String,
    pub attempts: u64,

    /// Attempts that scored at or above the success threshold
    pub successes: u64,

    /// Transport failures and timeouts
    pub failures: u64,
    pub total_cost_usd: f64,

    /// Exponential moving average of gate scores (failed calls excluded)
    pub ema_quality: f64,

    /// Timestamp of the latest attempt, ms since the Unix epoch
    pub last_used_ms: i64,
}

impl BackendMetric {
    pub(crate) fn new(backend_id: &str) -> Self {
        Self {
            backend_id: backend_id.to_string(),
            attempts: 0,
            successes: 0,
            failures: 0,
            total_cost_usd: 0.0,
            ema_quality: 0.0,
            last_used_ms: 0,
        }
    }

    pub(crate) fn observe(&mut self, record: &AttemptRecord, success_threshold: f64) {
        self.attempts += 1;
        self.total_cost_usd += record.cost_usd;
        self.last_used_ms = self.last_used_ms.max(record.timestamp_ms);
        if record.backend_failed {
            self.failures += 1;
            return;
        }
        if record.quality_score >= success_threshold {
            self.successes += 1;
        }
        let scored = self.attempts - self.failures;
        self.ema_quality = if scored == 1 {
            record.quality_score
        } else {
            EMA_ALPHA * record.quality_score + (1.0 - EMA_ALPHA) * self.ema_quality
        };
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successes, self.attempts)
    }

    pub fn avg_cost_usd(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.total_cost_usd / self.attempts as f64
        }
    }
}

/// Snapshot of routing outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {
    pub attempts: usize,
    pub tasks: usize,
    pub success_rate: f64,

    /// Share of attempts the gate sent up the ladder
    pub escalation_rate: f64,

    /// Share of first attempts the gate sent up the ladder
    pub first_attempt_escalation_rate: f64,

    /// Of rephrases followed by another attempt, the share that then delivered
    pub rephrase_recovery_rate: Option<f64>,

    /// Rephrases followed by another attempt
    pub rephrase_samples: usize,
    pub avg_cost_usd: f64,
    pub backends: Vec<BackendMetric>,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Build a report from attempts, oldest first.
pub fn summarize(records: &[AttemptRecord], success_threshold: f64) -> LearningReport {
    let mut report = summarize_outcomes(records, success_threshold);
    report.backends = backend_metrics(records, success_threshold);
    report
}

/// Per-backend figures over `records`, ordered by backend id.
pub fn backend_metrics(records: &[AttemptRecord], success_threshold: f64) -> Vec<BackendMetric> {
    let mut backends: BTreeMap<&str, BackendMetric> = BTreeMap::new();
    for record in records {
        backends
            .entry(record.backend_id.as_str())
            .or_insert_with(|| BackendMetric::new(&record.backend_id))
            .observe(record, success_threshold);
    }
    backends.into_values().collect()
}

/// Task-level rates over `records`, with `backends` left empty.
pub(crate) fn summarize_outcomes(records: &[AttemptRecord], success_threshold: f64) -> LearningReport {
    let mut by_attempt: HashMap<(&str, u32), Verdict> = HashMap::new();
    let mut tasks = std::collections::HashSet::new();

    let mut successes = 0u64;
    let mut escalations = 0u64;
    let mut first_attempts = 0u64;
    let mut first_escalations = 0u64;
    let mut total_cost = 0.0;

    for record in records {
        by_attempt.insert((record.task_id.as_str(), record.attempt_number), record.verdict);
        tasks.insert(record.task_id.as_str());

        total_cost += record.cost_usd;
        if !record.backend_failed && record.quality_score >= success_threshold {
            successes += 1;
        }
        let escalated = !record.backend_failed && record.verdict == Verdict::Escalate;
        if escalated {
            escalations += 1;
        }
        if record.attempt_number == 1 {
            first_attempts += 1;
            if escalated {
                first_escalations += 1;
            }
        }
    }

    let mut rephrase_samples = 0u64;
    let mut recovered = 0u64;
    for record in records.iter().filter(|r| r.verdict == Verdict::Rephrase) {
        if let Some(next) = by_attempt.get(&(record.task_id.as_str(), record.attempt_number + 1)) {
            rephrase_samples += 1;
            if *next == Verdict::Deliver {
                recovered += 1;
            }
        }
    }

    let attempts = records.len() as u64;
    LearningReport {
        attempts: records.len(),
        tasks: tasks.len(),
        success_rate: ratio(successes, attempts),
        escalation_rate: ratio(escalations, attempts),
        first_attempt_escalation_rate: ratio(first_escalations, first_attempts),
        rephrase_recovery_rate: (rephrase_samples > 0).then(|| ratio(recovered, rephrase_samples)),
        rephrase_samples: rephrase_samples as usize,
        avg_cost_usd: if attempts == 0 { 0.0 } else { total_cost / attempts as f64 },
        backends: Vec::new(),
    }
}
