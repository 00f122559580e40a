//! Stable content fingerprints for cache keys.
//!
//! Fingerprints are content-addressed: two callers submitting the same
//! normalized task share a cache entry.

use sha2::{Digest, Sha256};

use crate::types::Task;

/// Prefix distinguishing derived keys from caller-supplied ones.
pub const FINGERPRINT_PREFIX: &str = "fp:";

/// Lowercase and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 fingerprint of the task's kind, flags, system prompt and input.
///
/// The task id, ceilings and routing hints are excluded: they do not change
/// what a correct answer looks like.
pub fn fingerprint(task: &Task) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.kind.as_str().as_bytes());
    hasher.update([0u8]);

    let flags = [
        task.flags.client_facing,
        task.flags.final_deliverable,
        task.flags.structured_output,
        task.flags.requires_reasoning,
    ];
    hasher.update(flags.map(u8::from));
    hasher.update([0u8]);

    if let Some(system) = &task.system_prompt {
        hasher.update(normalize(system).as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(normalize(&task.input).as_bytes());

    format!("{}{}", FINGERPRINT_PREFIX, hex::encode(hasher.finalize()))
}

/// The task's explicit cache key, or its fingerprint.
pub fn cache_key(task: &Task) -> String {
    match &task.cache_key {
        Some(key) if !key.is_empty() => key.clone(),
        _ => fingerprint(task),
    }
}
