//! Escalation ladder.
//!
//! The fixed order backends are climbed in when quality is insufficient:
//! cheapest first, most capable last. Built once from the policy.

use tollgate_core::{BackendProfile, RoutingPolicy};

use crate::config::ConfigError;

/// Backends ordered by tier rank (ties broken by id).
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationLadder {
    rungs: Vec<BackendProfile>,
}

impl EscalationLadder {
    /// Build from a policy's backend registry.
    pub fn from_policy(policy: &RoutingPolicy) -> Result<Self, ConfigError> {
        let rungs: Vec<BackendProfile> = policy.ladder().into_iter().cloned().collect();
        if rungs.is_empty() {
            return Err(ConfigError::Invalid("escalation ladder has no backends".into()));
        }
        Ok(Self { rungs })
    }

    pub fn rungs(&self) -> &[BackendProfile] {
        &self.rungs
    }

    /// Position of a backend on the ladder.
    pub fn position(&self, backend: &str) -> Option<usize> {
        self.rungs.iter().position(|r| r.id == backend)
    }

    /// Every rung strictly above `backend`, nearest first.
    pub fn above(&self, backend: &str) -> &[BackendProfile] {
        match self.position(backend) {
            Some(pos) => &self.rungs[pos + 1..],
            None => &[],
        }
    }

    /// The next rung above `backend`.
    pub fn next_above(&self, backend: &str) -> Option<&BackendProfile> {
        self.above(backend).first()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rungs.iter().map(|r| r.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_order() {
        let ladder = EscalationLadder::from_policy(&RoutingPolicy::default()).unwrap();
        assert_eq!(ladder.ids(), vec!["economy", "standard", "premium", "frontier"]);
        assert_eq!(ladder.next_above("economy").unwrap().id, "standard");
        assert_eq!(ladder.above("standard").len(), 2);
        assert!(ladder.next_above("frontier").is_none());
        assert!(ladder.next_above("unknown").is_none());
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut policy = RoutingPolicy::default();
        policy.backends = vec![
            BackendProfile::new("zeta", 1.0, 1.0, 1000, 1),
            BackendProfile::new("alpha", 1.0, 1.0, 1000, 1),
        ];
        let ladder = EscalationLadder::from_policy(&policy).unwrap();
        assert_eq!(ladder.ids(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_empty_ladder_rejected() {
        let mut policy = RoutingPolicy::default();
        policy.backends.clear();
        assert!(matches!(
            EscalationLadder::from_policy(&policy),
            Err(ConfigError::Invalid(_))
        ));
    }
}
