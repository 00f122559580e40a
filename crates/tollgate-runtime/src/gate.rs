//! Quality gate.
//!
//! Runs the deterministic scorers from `tollgate-core`, adds the async
//! grounding sub-score, and turns the weighted composite into a verdict.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::quality::score_all;
use tollgate_core::{assess, default_scorers, Assessment, QualityPolicy, Scorer, ScoringContext, Task};

use crate::grounding::{GroundingChecker, GroundingReport, LexicalVerifier};

/// Everything the gate found about one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub assessment: Assessment,
    pub grounding: GroundingReport,
}

impl GateReport {
    pub fn score(&self) -> f64 {
        self.assessment.score
    }

    /// Spend of grounding verification calls.
    pub fn verification_cost_usd(&self) -> f64 {
        self.grounding.cost_usd
    }
}

/// Judges an output before it is delivered.
#[async_trait]
pub trait OutputGate: Send + Sync {
    async fn evaluate(&self, task: &Task, output: &str, context: &[String]) -> GateReport;

    /// Most that evaluating an output of up to `output_tokens` tokens for
    /// `task` may spend. Added to the attempt estimate before admission.
    fn verification_estimate_usd(&self, _task: &Task, _output_tokens: u64) -> f64 {
        0.0
    }
}

/// The default gate: heuristic scorers plus grounding.
pub struct QualityGate {
    policy: QualityPolicy,
    scorers: Vec<Box<dyn Scorer>>,
    grounding: GroundingChecker,
}

impl QualityGate {
    pub fn new(policy: QualityPolicy, grounding: GroundingChecker) -> Self {
        Self {
            scorers: default_scorers(&policy),
            policy,
            grounding,
        }
    }

    /// A gate whose grounding check is purely lexical.
    pub fn lexical(policy: QualityPolicy, timeout: Duration) -> Self {
        let max_claims = policy.max_claims;
        Self::new(
            policy,
            GroundingChecker::new(Arc::new(LexicalVerifier), timeout, max_claims),
        )
    }

    /// Replace the heuristic scorers.
    pub fn with_scorers(mut self, scorers: Vec<Box<dyn Scorer>>) -> Self {
        self.scorers = scorers;
        self
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }
}

#[async_trait]
impl OutputGate for QualityGate {
    async fn evaluate(&self, task: &Task, output: &str, context: &[String]) -> GateReport {
        let ctx = ScoringContext { task, context };
        let mut sub_scores = score_all(&self.scorers, output, &ctx);

        let grounding = self.grounding.check(output, context).await;
        sub_scores.push(grounding.sub_score());

        let assessment = assess(&self.policy, task, sub_scores);
        tracing::debug!(
            task_id = %task.id,
            score = assessment.score,
            grounding = assessment.grounding,
            verdict = %assessment.verdict,
            verifier = self.grounding.verifier_name(),
            "Output assessed"
        );
        GateReport {
            assessment,
            grounding,
        }
    }

    fn verification_estimate_usd(&self, task: &Task, output_tokens: u64) -> f64 {
        self.grounding
            .estimate_cost_usd(output_tokens, &task.context_history)
    }
}
