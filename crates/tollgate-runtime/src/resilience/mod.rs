//! Resilience patterns for tollgate-runtime.
//!
//! This module provides:
//! - Multi-window budget guardrail with alert de-duplication
//! - Circuit breaker per backend
//! - The escalation ladder

mod alerts;
mod budget;
mod circuit_breaker;
mod ladder;

pub use alerts::{AlertDeduplicator, AlertRecord};
pub use budget::{
    AdmissionDecision, BudgetError, BudgetGuardrail, BudgetScope, BudgetState, BudgetWindow,
    HeldReservation, LimitBreach, LimitScope, Reservation, WindowStatus,
};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use ladder::EscalationLadder;
