//! Initial backend selection.

use serde::{Deserialize, Serialize};

use crate::policy::{PolicyError, RoutingPolicy};
use crate::types::{BackendProfile, ComplexityScore, Task, TaskShape};

/// Why a backend was picked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Forced,
    Structural,
    Visual,
    CreativePremium,
    CreativeDefault,
}

/// Pick the first backend for a task.
///
/// A forced backend wins. Otherwise the shape picks the tier; creative work
/// goes premium when the score is above `premium_threshold` or the task
/// requires reasoning.
pub fn select_initial<'a>(
    policy: &'a RoutingPolicy,
    score: &ComplexityScore,
    task: &Task,
    premium_threshold: f64,
) -> Result<(&'a BackendProfile, SelectionReason), PolicyError> {
    if let Some(forced) = &task.forced_backend {
        return Ok((policy.backend(forced)?, SelectionReason::Forced));
    }

    let routing = &policy.routing;
    let (id, reason) = match score.shape {
        TaskShape::Structural => (&routing.structural, SelectionReason::Structural),
        TaskShape::Visual => (&routing.visual, SelectionReason::Visual),
        TaskShape::Creative
            if score.value > premium_threshold || task.flags.requires_reasoning =>
        {
            (&routing.creative_premium, SelectionReason::CreativePremium)
        }
        TaskShape::Creative => (&routing.creative_default, SelectionReason::CreativeDefault),
    };

    Ok((policy.backend(id)?, reason))
}
