//! Per-backend circuit breaker.
//!
//! A backend whose transport keeps failing is taken off the ladder until
//! `recovery_timeout` has passed on the router's clock. The next call is a
//! half-open trial: enough successes close the circuit, one failure opens
//! it again.
//!
//! Quality verdicts never touch the breaker; only failed or timed-out calls
//! count.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::{Clock, SystemClock};

use crate::config::duration_str;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a circuit
    pub failure_threshold: u32,

    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Trial successes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed { failures: u32 },

    /// Skipped until `retry_at`
    Open { retry_at: DateTime<Utc> },

    HalfOpen { successes: u32 },
}

impl CircuitState {
    const HEALTHY: CircuitState = CircuitState::Closed { failures: 0 };
}

/// Circuits keyed by backend id.
pub struct CircuitBreaker {
    circuits: DashMap<String, CircuitState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether calls to `backend` should be skipped right now.
    ///
    /// An open circuit past its retry time moves to half-open here.
    pub fn is_open(&self, backend: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(backend) else {
            return false;
        };
        let state = *circuit;
        match state {
            CircuitState::Open { retry_at } if self.clock.now() < retry_at => true,
            CircuitState::Open { .. } => {
                *circuit = CircuitState::HalfOpen { successes: 0 };
                tracing::info!(backend, "Circuit half-open, next call is a trial");
                false
            }
            _ => false,
        }
    }

    pub fn record_success(&self, backend: &str) {
        let Some(mut circuit) = self.circuits.get_mut(backend) else {
            return;
        };
        let state = *circuit;
        *circuit = match state {
            CircuitState::HalfOpen { successes } if successes + 1 >= self.config.success_threshold => {
                tracing::info!(backend, "Circuit closed, backend recovered");
                CircuitState::HEALTHY
            }
            CircuitState::HalfOpen { successes } => CircuitState::HalfOpen {
                successes: successes + 1,
            },
            CircuitState::Closed { .. } => CircuitState::HEALTHY,
            open => open,
        };
    }

    /// Record a failed or timed-out call.
    pub fn record_failure(&self, backend: &str) {
        let mut circuit = self
            .circuits
            .entry(backend.to_string())
            .or_insert(CircuitState::HEALTHY);
        let state = *circuit;
        let next = match state {
            CircuitState::Closed { failures } if failures + 1 >= self.config.failure_threshold => {
                tracing::warn!(backend, failures = failures + 1, "Circuit opened");
                self.open_state()
            }
            CircuitState::Closed { failures } => CircuitState::Closed { failures: failures + 1 },
            CircuitState::HalfOpen { .. } => {
                tracing::warn!(backend, "Trial call failed, circuit reopened");
                self.open_state()
            }
            open @ CircuitState::Open { .. } => open,
        };
        *circuit = next;
    }

    fn open_state(&self) -> CircuitState {
        let retry_at = chrono::Duration::from_std(self.config.recovery_timeout)
            .ok()
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        CircuitState::Open { retry_at }
    }

    pub fn state(&self, backend: &str) -> CircuitState {
        self.circuits
            .get(backend)
            .map(|c| *c)
            .unwrap_or(CircuitState::HEALTHY)
    }

    /// Backends whose circuit is not closed.
    pub fn tripped(&self) -> Vec<(String, CircuitState)> {
        let mut tripped: Vec<_> = self
            .circuits
            .iter()
            .filter(|c| !matches!(c.value(), CircuitState::Closed { .. }))
            .map(|c| (c.key().clone(), *c.value()))
            .collect();
        tripped.sort_by(|a, b| a.0.cmp(&b.0));
        tripped
    }

    pub fn reset(&self) {
        self.circuits.clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tollgate_core::ManualClock;

    fn breaker(threshold: u32, clock: &ManualClock) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        })
        .with_clock(Arc::new(clock.clone()))
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap())
    }

    #[test]
    fn test_unknown_backend_is_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open("economy"));
        assert_eq!(cb.state("economy"), CircuitState::Closed { failures: 0 });
        assert!(cb.tripped().is_empty());
    }

    #[test]
    fn test_opens_at_threshold_and_success_resets_count() {
        let clock = clock();
        let cb = breaker(2, &clock);
        cb.record_failure("economy");
        cb.record_success("economy");
        cb.record_failure("economy");
        assert!(!cb.is_open("economy"));
        cb.record_failure("economy");
        assert!(cb.is_open("economy"));
        assert!(!cb.is_open("premium"));
        assert_eq!(cb.tripped().len(), 1);
    }

    #[test]
    fn test_trial_call_closes_or_reopens() {
        let clock = clock();
        let cb = breaker(1, &clock);
        cb.record_failure("economy");
        assert!(cb.is_open("economy"));

        clock.advance(chrono::Duration::seconds(29));
        assert!(cb.is_open("economy"));
        clock.advance(chrono::Duration::seconds(2));
        assert!(!cb.is_open("economy"));
        assert_eq!(cb.state("economy"), CircuitState::HalfOpen { successes: 0 });

        cb.record_failure("economy");
        assert!(cb.is_open("economy"));

        clock.advance(chrono::Duration::seconds(31));
        assert!(!cb.is_open("economy"));
        cb.record_success("economy");
        assert_eq!(cb.state("economy"), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_config_durations_are_human_readable() {
        let config: CircuitBreakerConfig =
            serde_yaml::from_str("recovery_timeout: 2m\nfailure_threshold: 4").unwrap();
        assert_eq!(config.recovery_timeout, Duration::from_secs(120));
        assert_eq!(config.failure_threshold, 4);
        assert_eq!(config.success_threshold, 1);
    }
}
