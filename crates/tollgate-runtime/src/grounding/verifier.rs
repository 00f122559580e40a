//! Claim verifiers.
//!
//! A verifier answers one question: does the context support this claim?
//! [`LexicalVerifier`] answers it by word overlap at no cost;
//! [`BackendVerifier`] asks a (cheap) backend for a yes/no answer and
//! reports what the call cost.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::{estimate_cost, estimate_tokens, is_supported_lexically, Claim};

use super::GroundingError;
use crate::backends::{Backend, InvokeParams};
use crate::prompts::{parse_yes_no, verification_prompt, VERIFIER_MAX_TOKENS, VERIFIER_SYSTEM_PROMPT};

/// Result of verifying one claim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub grounded: bool,

    /// Spend incurred by the check
    pub cost_usd: f64,
}

/// Checks a claim against context.
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    async fn verify(&self, claim: &Claim, context: &[String]) -> Result<Verification, GroundingError>;

    fn name(&self) -> &str;

    /// Upper bound on the spend of verifying `claims` claims totalling
    /// `claim_tokens` tokens against `context`.
    fn estimate_cost_usd(&self, _claims: usize, _claim_tokens: u64, _context: &[String]) -> f64 {
        0.0
    }
}

/// Deterministic overlap check.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalVerifier;

#[async_trait]
impl ClaimVerifier for LexicalVerifier {
    async fn verify(&self, claim: &Claim, context: &[String]) -> Result<Verification, GroundingError> {
        Ok(Verification {
            grounded: is_supported_lexically(&claim.text, context),
            cost_usd: 0.0,
        })
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// Yes/no verification through a backend.
pub struct BackendVerifier {
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl BackendVerifier {
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }
}

#[async_trait]
impl ClaimVerifier for BackendVerifier {
    async fn verify(&self, claim: &Claim, context: &[String]) -> Result<Verification, GroundingError> {
        let params = InvokeParams {
            system_prompt: Some(VERIFIER_SYSTEM_PROMPT.trim().to_string()),
            max_tokens: VERIFIER_MAX_TOKENS,
            temperature: 0.0,
            timeout: self.timeout,
        };
        let generation = self
            .backend
            .invoke(&verification_prompt(&claim.text, context), &params)
            .await?;
        let cost_usd = estimate_cost(self.backend.profile(), generation.tokens_in, generation.tokens_out);

        let grounded = match parse_yes_no(&generation.text) {
            Some(answer) => answer,
            None => {
                tracing::debug!(
                    backend = self.backend.id(),
                    pointer = %claim.pointer(),
                    "Verifier answer unreadable, counting claim as ungrounded"
                );
                false
            }
        };
        Ok(Verification { grounded, cost_usd })
    }

    fn name(&self) -> &str {
        self.backend.id()
    }

    fn estimate_cost_usd(&self, claims: usize, claim_tokens: u64, context: &[String]) -> f64 {
        let claims = claims as u64;
        let per_call_in = estimate_tokens(&verification_prompt("", context))
            + estimate_tokens(VERIFIER_SYSTEM_PROMPT.trim());
        estimate_cost(
            self.backend.profile(),
            claims * per_call_in + claim_tokens,
            claims * u64::from(VERIFIER_MAX_TOKENS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, Generation};
    use tollgate_core::BackendProfile;

    struct Answering {
        profile: BackendProfile,
        answer: &'static str,
    }

    #[async_trait]
    impl Backend for Answering {
        async fn invoke(&self, prompt: &str, params: &InvokeParams) -> Result<Generation, BackendError> {
            assert!(prompt.contains("Claim:"));
            assert_eq!(params.max_tokens, VERIFIER_MAX_TOKENS);
            Ok(Generation {
                text: self.answer.to_string(),
                tokens_in: 1_000_000,
                tokens_out: 0,
            })
        }

        fn profile(&self) -> &BackendProfile {
            &self.profile
        }
    }

    fn claim(text: &str) -> Claim {
        Claim {
            text: text.to_string(),
            start: 0,
            end: text.len(),
        }
    }

    #[tokio::test]
    async fn test_lexical_verifier() {
        let context = vec!["Revenue grew 12% to 4.5 million in 2024.".to_string()];
        let v = LexicalVerifier;
        assert!(v.verify(&claim("Revenue grew 12% in 2024."), &context).await.unwrap().grounded);
        assert!(!v.verify(&claim("Revenue grew 30% in 2024."), &context).await.unwrap().grounded);
    }

    #[tokio::test]
    async fn test_backend_verifier_reports_cost() {
        let backend = Arc::new(Answering {
            profile: BackendProfile::new("economy", 0.25, 1.25, 4096, 1),
            answer: "YES",
        });
        let v = BackendVerifier::new(backend, Duration::from_secs(1));
        let result = v.verify(&claim("The sky is green."), &["ctx".into()]).await.unwrap();
        assert!(result.grounded);
        assert!((result.cost_usd - 0.25).abs() < 1e-9);
        assert_eq!(v.name(), "economy");
    }

    #[test]
    fn test_backend_verifier_cost_estimate_covers_calls() {
        let backend = Arc::new(Answering {
            profile: BackendProfile::new("economy", 1.0, 4.0, 4096, 1),
            answer: "YES",
        });
        let v = BackendVerifier::new(backend, Duration::from_secs(1));
        let context = vec!["Revenue grew 12% to 4.5 million in 2024.".repeat(50)];
        let one = v.estimate_cost_usd(1, 20, &context);
        let eight = v.estimate_cost_usd(8, 20, &context);
        assert!(one > 0.0);
        assert!(eight > 7.0 * one);
        assert_eq!(LexicalVerifier.estimate_cost_usd(8, 20, &context), 0.0);
    }

    #[tokio::test]
    async fn test_backend_verifier_unreadable_is_ungrounded() {
        let backend = Arc::new(Answering {
            profile: BackendProfile::new("economy", 0.25, 1.25, 4096, 1),
            answer: "Possibly",
        });
        let v = BackendVerifier::new(backend, Duration::from_secs(1));
        assert!(!v.verify(&claim("The sky is green."), &["ctx".into()]).await.unwrap().grounded);
    }
}
