//! Factual grounding check.
//!
//! Extracts checkable claims from an output and verifies each against the
//! task's context, concurrently and under a per-claim timeout. A claim whose
//! verification times out or errors counts as ungrounded.
//!
//! Short circuits:
//! - empty context: score 1.0 without extracting anything
//! - no extractable claims: score 1.0 (nothing to falsify)

mod verifier;

pub use verifier::{BackendVerifier, ClaimVerifier, LexicalVerifier, Verification};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tollgate_core::{extract_claims, Claim, Dimension, SubScore};

use crate::backends::BackendError;

/// Errors from a single verification.
#[derive(Error, Debug)]
pub enum GroundingError {
    #[error("Verification backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Verification timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimFinding {
    pub claim: Claim,
    pub grounded: bool,

    /// Why verification could not complete, if it didn't
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Grounding result for one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingReport {
    /// Fraction of claims grounded
    pub score: f64,
    pub findings: Vec<ClaimFinding>,

    /// Spend of verification calls
    pub cost_usd: f64,

    /// Context was empty, nothing was checked
    pub skipped: bool,
}

impl GroundingReport {
    fn trivially_grounded(skipped: bool) -> Self {
        Self {
            score: 1.0,
            findings: Vec::new(),
            cost_usd: 0.0,
            skipped,
        }
    }

    /// The grounding sub-score with a finding per unsupported claim.
    pub fn sub_score(&self) -> SubScore {
        let mut sub = SubScore::clean(Dimension::Grounding, self.score);
        for finding in self.findings.iter().filter(|f| !f.grounded) {
            sub.issues.push(format!(
                "Unsupported claim at {}: \"{}\"",
                finding.claim.pointer(),
                finding.claim.text
            ));
        }
        if !sub.issues.is_empty() {
            sub.suggestions
                .push("Remove or correct statements the provided context does not support".to_string());
        }
        sub
    }
}

/// Runs claim verification for outputs.
pub struct GroundingChecker {
    verifier: Arc<dyn ClaimVerifier>,
    timeout: Duration,
    max_claims: usize,
}

impl GroundingChecker {
    pub fn new(verifier: Arc<dyn ClaimVerifier>, timeout: Duration, max_claims: usize) -> Self {
        Self {
            verifier,
            timeout,
            max_claims,
        }
    }

    pub fn verifier_name(&self) -> &str {
        self.verifier.name()
    }

    /// Most that [`check`](Self::check) can spend on an output of up to
    /// `output_tokens` tokens: every claim slot used, the claims together no
    /// longer than the output.
    pub fn estimate_cost_usd(&self, output_tokens: u64, context: &[String]) -> f64 {
        if context.iter().all(|c| c.trim().is_empty()) {
            return 0.0;
        }
        self.verifier
            .estimate_cost_usd(self.max_claims, output_tokens, context)
    }

    pub async fn check(&self, output: &str, context: &[String]) -> GroundingReport {
        if context.iter().all(|c| c.trim().is_empty()) {
            return GroundingReport::trivially_grounded(true);
        }
        let claims = extract_claims(output, self.max_claims);
        if claims.is_empty() {
            return GroundingReport::trivially_grounded(false);
        }

        let checks = claims.iter().map(|claim| async move {
            match tokio::time::timeout(self.timeout, self.verifier.verify(claim, context)).await {
                Ok(result) => result,
                Err(_) => Err(GroundingError::Timeout(self.timeout)),
            }
        });
        let results = join_all(checks).await;

        let mut cost_usd = 0.0;
        let mut findings = Vec::with_capacity(claims.len());
        for (claim, result) in claims.into_iter().zip(results) {
            match result {
                Ok(v) => {
                    cost_usd += v.cost_usd;
                    findings.push(ClaimFinding {
                        claim,
                        grounded: v.grounded,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        verifier = self.verifier.name(),
                        pointer = %claim.pointer(),
                        error = %e,
                        "Claim verification failed, counting as ungrounded"
                    );
                    findings.push(ClaimFinding {
                        claim,
                        grounded: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let grounded = findings.iter().filter(|f| f.grounded).count();
        GroundingReport {
            score: grounded as f64 / findings.len() as f64,
            findings,
            cost_usd,
            skipped: false,
        }
    }
}
