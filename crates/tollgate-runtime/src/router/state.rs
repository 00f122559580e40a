//! Per-task routing state machine.
//!
//! ```text
//! Queued ──> CacheCheck ──> Delivered
//!   │            │
//!   └────────────┴──> Dispatching ──> Invoking ──> Validating ──> Delivered
//!                                      ^   │            │
//!                                      │   │            ├──> Rephrasing ──┐
//!                                      │   v            v                 │
//!                                      └── Escalating <─┘                 │
//!                                      ^                                  │
//!                                      └──────────────────────────────────┘
//! ```
//!
//! Any non-terminal state after `CacheCheck` may move to `Failed`.
//! `Escalating` may also end in `Delivered` when no rung is left and the best
//! output so far is handed back.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a task is in its routing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Queued,
    CacheCheck,
    Dispatching,
    Invoking,
    Validating,
    Rephrasing,
    Escalating,
    Delivered,
    Failed,
}

impl RouteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteState::Delivered | RouteState::Failed)
    }

    pub fn can_transition_to(&self, next: RouteState) -> bool {
        use RouteState::*;
        matches!(
            (self, next),
            (Queued, CacheCheck)
                | (Queued, Dispatching)
                | (Queued, Failed)
                | (CacheCheck, Delivered)
                | (CacheCheck, Dispatching)
                | (Dispatching, Invoking)
                | (Dispatching, Failed)
                | (Invoking, Validating)
                | (Invoking, Escalating)
                | (Invoking, Failed)
                | (Validating, Delivered)
                | (Validating, Rephrasing)
                | (Validating, Escalating)
                | (Validating, Failed)
                | (Rephrasing, Invoking)
                | (Rephrasing, Failed)
                | (Escalating, Invoking)
                | (Escalating, Delivered)
                | (Escalating, Failed)
        )
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteState::Queued => "queued",
            RouteState::CacheCheck => "cache_check",
            RouteState::Dispatching => "dispatching",
            RouteState::Invoking => "invoking",
            RouteState::Validating => "validating",
            RouteState::Rephrasing => "rephrasing",
            RouteState::Escalating => "escalating",
            RouteState::Delivered => "delivered",
            RouteState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A transition the state table does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid route transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RouteState,
    pub to: RouteState,
}

/// Tracks one task's state and the path it took.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: RouteState,
    trail: Vec<RouteState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: RouteState::Queued,
            trail: vec![RouteState::Queued],
        }
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    /// Every state visited, in order.
    pub fn trail(&self) -> &[RouteState] {
        &self.trail
    }

    pub fn advance(&mut self, next: RouteState) -> Result<RouteState, InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = %self.state, to = %next, "Route transition");
        self.state = next;
        self.trail.push(next);
        Ok(next)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RouteState::*;

    #[test]
    fn test_cache_hit_path() {
        let mut sm = StateMachine::new();
        sm.advance(CacheCheck).unwrap();
        sm.advance(Delivered).unwrap();
        assert!(sm.state().is_terminal());
        assert_eq!(sm.trail(), &[Queued, CacheCheck, Delivered]);
    }

    #[test]
    fn test_rephrase_then_escalate_path() {
        let mut sm = StateMachine::new();
        for next in [
            Dispatching,
            Invoking,
            Validating,
            Rephrasing,
            Invoking,
            Validating,
            Escalating,
            Invoking,
            Validating,
            Delivered,
        ] {
            sm.advance(next).unwrap();
        }
        assert_eq!(sm.state(), Delivered);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Delivered, Failed] {
            for next in [
                Queued,
                CacheCheck,
                Dispatching,
                Invoking,
                Validating,
                Rephrasing,
                Escalating,
                Delivered,
                Failed,
            ] {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut sm = StateMachine::new();
        let err = sm.advance(Validating).unwrap_err();
        assert_eq!(err.from, Queued);
        assert_eq!(err.to, Validating);
        assert_eq!(sm.state(), Queued);

        sm.advance(CacheCheck).unwrap();
        assert!(sm.advance(Rephrasing).is_err());
    }
}
