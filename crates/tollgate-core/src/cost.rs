//! Cost model.
//!
//! Pure arithmetic over a [`BackendProfile`]'s per-million-token prices.
//! The zero-cost `cached` tier always costs nothing.

use serde::{Deserialize, Serialize};

use crate::types::{BackendProfile, Task};

/// Average characters per token used for estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Monetary cost in USD of one call with the given token counts.
pub fn estimate_cost(profile: &BackendProfile, tokens_in: u64, tokens_out: u64) -> f64 {
    if profile.is_cached() {
        return 0.0;
    }
    (tokens_in as f64 / 1_000_000.0) * profile.cost_per_million_input
        + (tokens_out as f64 / 1_000_000.0) * profile.cost_per_million_output
}

/// Approximate token count of `text`.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / CHARS_PER_TOKEN) as u64
}

/// Output tokens an attempt may produce: the backend maximum, capped by the
/// task's token ceiling when it has one.
pub fn effective_max_tokens(profile: &BackendProfile, task: &Task) -> u32 {
    match task.token_ceiling {
        Some(ceiling) => ceiling.min(profile.max_tokens),
        None => profile.max_tokens,
    }
}

/// Pre-flight estimate for one attempt on one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub backend_id: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

/// Estimate the cost of sending `prompt` to `profile` on behalf of `task`.
///
/// Output tokens are taken at the effective maximum, so the estimate is an
/// upper bound on what the attempt can cost.
pub fn estimate_attempt(profile: &BackendProfile, task: &Task, prompt: &str) -> CostEstimate {
    let system_tokens = task
        .system_prompt
        .as_deref()
        .map(estimate_tokens)
        .unwrap_or(0);
    let tokens_in = estimate_tokens(prompt) + system_tokens;
    let tokens_out = u64::from(effective_max_tokens(profile, task));

    CostEstimate {
        backend_id: profile.id.clone(),
        tokens_in,
        tokens_out,
        cost_usd: estimate_cost(profile, tokens_in, tokens_out),
    }
}
