//! Router and escalation engine.
//!
//! The router owns a task from submission to a terminal result:
//!
//! 1. **Cache**: a live entry under the task's key is delivered at zero cost
//! 2. **Selection**: classify, then pick the initial backend from the
//!    routing table (skipping backends whose circuit is open)
//! 3. **Attempts** (bounded by `max_attempts`): estimate generation plus
//!    verification, reserve it against the budget, invoke under a timeout,
//!    gate the output, settle the reservation at the actual cost (or release
//!    it when the call failed)
//! 4. **Verdict**: deliver, rephrase on the same backend, or escalate up the
//!    ladder
//!
//! Budget rejection ends the task immediately and is never retried here.
//! Backend failures move to the task's fallback list, or up the ladder when
//! none was given. When quality never clears the gate, the best output seen
//! is delivered with `low_confidence` set instead of failing the caller.
//!
//! Every attempt is recorded with the learning loop, including failed calls.

mod rephrase;
mod state;

pub use rephrase::{AppendCorrections, RephraseStrategy};
pub use state::{InvalidTransition, RouteState, StateMachine};

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tollgate_core::{
    cache_key, effective_max_tokens, estimate_attempt, estimate_cost, select_initial, AttemptRecord,
    Classifier, Clock, ComplexityScore, RoutingPolicy, SelectionReason, SystemClock, Task, Verdict,
    CACHED_BACKEND_ID,
};

use crate::backends::{BackendError, BackendRegistry, InvokeParams};
use crate::cache::ResponseCache;
use crate::config::{ConfigError, RuntimeConfig};
use crate::gate::{GateReport, OutputGate, QualityGate};
use crate::grounding::{ClaimVerifier, GroundingChecker, LexicalVerifier};
use crate::learning::{LearningLoop, RoutingThresholds};
use crate::notify::Notifier;
use crate::prompts::render_prompt;
use crate::resilience::{AdmissionDecision, BudgetGuardrail, CircuitBreaker, EscalationLadder, LimitBreach};
use crate::secrets::AdminCredential;
use crate::store::{MemoryStore, Store};

/// Errors that end a task.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Budget exceeded: {}", .0.reason)]
    BudgetExceeded(Box<AdmissionDecision>),

    #[error("All backends failed for task '{task_id}' after {attempts} attempt(s): {last_error}")]
    AllBackendsFailed {
        task_id: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Internal routing error: {0}")]
    Internal(#[from] InvalidTransition),
}

/// Stable error codes of the submit API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BudgetExceeded,
    AllBackendsFailed,
    InvalidTask,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BudgetExceeded => "BUDGET_EXCEEDED",
            ErrorCode::AllBackendsFailed => "ALL_BACKENDS_FAILED",
            ErrorCode::InvalidTask => "INVALID_TASK",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned to callers of [`Router::submit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct SubmitError {
    pub code: ErrorCode,

    /// Whether resubmitting the same task may succeed
    pub retriable: bool,
    pub message: String,

    /// Budget left in the breached scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_budget_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breach: Option<LimitBreach>,
}

impl From<RouteError> for SubmitError {
    fn from(err: RouteError) -> Self {
        let message = err.to_string();
        match err {
            RouteError::InvalidTask(_) => Self {
                code: ErrorCode::InvalidTask,
                retriable: false,
                message,
                remaining_budget_usd: None,
                breach: None,
            },
            RouteError::BudgetExceeded(decision) => Self {
                code: ErrorCode::BudgetExceeded,
                retriable: false,
                message,
                remaining_budget_usd: decision.breach.as_ref().map(|b| b.remaining_usd),
                breach: decision.breach,
            },
            RouteError::AllBackendsFailed { .. } => Self {
                code: ErrorCode::AllBackendsFailed,
                retriable: true,
                message,
                remaining_budget_usd: None,
                breach: None,
            },
            RouteError::Internal(_) => Self {
                code: ErrorCode::Internal,
                retriable: false,
                message,
                remaining_budget_usd: None,
                breach: None,
            },
        }
    }
}

/// How a result was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMetadata {
    pub task_id: String,

    /// Backend whose output was delivered (`cached` for cache hits)
    pub backend_id: String,

    /// Backend invocations made
    pub attempts: u32,

    /// Spend committed for this task, verification included
    pub cost_usd: f64,
    pub quality_score: f64,

    /// Grounding sub-score of the delivered output (none for cache hits)
    pub grounding: Option<f64>,
    pub verdict: Verdict,
    pub cache_hit: bool,

    /// Delivered without clearing the gate
    pub low_confidence: bool,
    pub complexity: Option<ComplexityScore>,
    pub selection_reason: Option<SelectionReason>,
    pub trail: Vec<RouteState>,

    /// Gate findings for the delivered output
    pub issues: Vec<String>,
}

/// A delivered result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub output: String,
    pub metadata: RouteMetadata,
}

/// An output that went through the gate.
struct Candidate {
    output: String,
    backend_id: String,
    report: GateReport,
}

/// Accumulated state of one task's attempts.
struct Progress {
    attempts: u32,
    cost_usd: f64,
    best: Option<Candidate>,
    last_error: Option<String>,
    failed: HashSet<String>,

    /// Remaining explicit fallbacks, used instead of the ladder on failure
    fallbacks: Option<VecDeque<String>>,
}

impl Progress {
    fn new(task: &Task) -> Self {
        Self {
            attempts: 0,
            cost_usd: 0.0,
            best: None,
            last_error: None,
            failed: HashSet::new(),
            fallbacks: (!task.fallback_backends.is_empty())
                .then(|| task.fallback_backends.iter().cloned().collect()),
        }
    }

    fn offer(&mut self, candidate: Candidate) {
        let better = match &self.best {
            Some(best) => candidate.report.score() > best.report.score(),
            None => true,
        };
        if better {
            self.best = Some(candidate);
        }
    }
}

/// Handles to the router's periodic tasks. Dropping aborts them.
pub struct BackgroundTasks {
    sweeper: JoinHandle<()>,
    learning: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Abort both tasks.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.sweeper.abort();
        self.learning.abort();
    }
}

/// Builds a [`Router`], validating configuration up front.
pub struct RouterBuilder {
    policy: RoutingPolicy,
    backends: BackendRegistry,
    config: RuntimeConfig,
    store: Option<Arc<dyn Store>>,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<dyn Notifier>>,
    gate: Option<Arc<dyn OutputGate>>,
    verifier: Option<Arc<dyn ClaimVerifier>>,
    rephrase: Option<Arc<dyn RephraseStrategy>>,
    admin: Option<AdminCredential>,
}

impl RouterBuilder {
    pub fn new(policy: RoutingPolicy, backends: BackendRegistry) -> Self {
        Self {
            policy,
            backends,
            config: RuntimeConfig::default(),
            store: None,
            clock: None,
            notifier: None,
            gate: None,
            verifier: None,
            rephrase: None,
            admin: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the quality gate entirely.
    pub fn gate(mut self, gate: Arc<dyn OutputGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Claim verifier for the default gate (lexical when unset).
    pub fn verifier(mut self, verifier: Arc<dyn ClaimVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn rephrase(mut self, strategy: Arc<dyn RephraseStrategy>) -> Self {
        self.rephrase = Some(strategy);
        self
    }

    /// Enable the budget override with this credential.
    pub fn admin(mut self, admin: AdminCredential) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn build(self) -> Result<Router, ConfigError> {
        self.policy.validate()?;
        self.config.validate()?;
        self.backends.check_against(&self.policy)?;
        let ladder = EscalationLadder::from_policy(&self.policy)?;

        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mut budget = BudgetGuardrail::new(self.policy.budget.clone(), Arc::clone(&store))
            .with_clock(Arc::clone(&clock))
            .with_alert_config(&self.config.alerts);
        if let Some(notifier) = self.notifier {
            budget = budget.with_notifier(notifier);
        }
        if let Some(admin) = self.admin {
            budget = budget.with_admin(admin);
        }

        let thresholds = Arc::new(RoutingThresholds::new(self.policy.routing.premium_threshold));
        let learning = LearningLoop::new(self.config.learning.clone(), thresholds).with_store(store);

        let gate = match self.gate {
            Some(gate) => gate,
            None => {
                let verifier = self.verifier.unwrap_or_else(|| Arc::new(LexicalVerifier));
                let grounding = GroundingChecker::new(
                    verifier,
                    self.config.verification_timeout,
                    self.policy.quality.max_claims,
                );
                Arc::new(QualityGate::new(self.policy.quality.clone(), grounding))
            }
        };

        tracing::info!(
            policy = %self.policy.name,
            backends = ?self.backends.ids(),
            ladder = ?ladder.ids(),
            max_attempts = self.config.max_attempts,
            "Router built"
        );

        Ok(Router {
            classifier: Classifier::new(self.policy.classifier.clone()),
            cache: Arc::new(ResponseCache::with_clock(&self.config.cache, Arc::clone(&clock))),
            breaker: Arc::new(
                CircuitBreaker::new(self.config.circuit_breaker.clone()).with_clock(Arc::clone(&clock)),
            ),
            budget: Arc::new(budget),
            learning: Arc::new(learning),
            rephrase: self.rephrase.unwrap_or_else(|| Arc::new(AppendCorrections)),
            policy: Arc::new(self.policy),
            backends: self.backends,
            config: self.config,
            ladder,
            gate,
            clock,
        })
    }
}

/// Cost-governed router over a set of backends.
pub struct Router {
    policy: Arc<RoutingPolicy>,
    config: RuntimeConfig,
    backends: BackendRegistry,
    ladder: EscalationLadder,
    classifier: Classifier,
    budget: Arc<BudgetGuardrail>,
    cache: Arc<ResponseCache>,
    learning: Arc<LearningLoop>,
    breaker: Arc<CircuitBreaker>,
    gate: Arc<dyn OutputGate>,
    rephrase: Arc<dyn RephraseStrategy>,
    clock: Arc<dyn Clock>,
}

impl Router {
    pub fn builder(policy: RoutingPolicy, backends: BackendRegistry) -> RouterBuilder {
        RouterBuilder::new(policy, backends)
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn ladder(&self) -> &EscalationLadder {
        &self.ladder
    }

    pub fn budget(&self) -> &Arc<BudgetGuardrail> {
        &self.budget
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn learning(&self) -> &Arc<LearningLoop> {
        &self.learning
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Start the cache sweeper and the learning loop's periodic analysis.
    pub fn spawn_background(&self) -> BackgroundTasks {
        BackgroundTasks {
            sweeper: Arc::clone(&self.cache).spawn_sweeper(self.config.cache.sweep_interval),
            learning: Arc::clone(&self.learning).spawn_periodic(),
        }
    }

    /// Route a task, mapping failures to stable error codes.
    pub async fn submit(&self, task: Task) -> Result<RouteOutcome, SubmitError> {
        self.route(&task).await.map_err(SubmitError::from)
    }

    /// Route a task to a terminal result.
    pub async fn route(&self, task: &Task) -> Result<RouteOutcome, RouteError> {
        let mut sm = StateMachine::new();
        if let Err(e) = self.validate_task(task) {
            sm.advance(RouteState::Failed)?;
            tracing::warn!(task_id = %task.id, error = %e, "Task rejected");
            return Err(e);
        }

        let key = cache_key(task);
        if !task.skip_cache {
            sm.advance(RouteState::CacheCheck)?;
            if let Some(entry) = self.cache.get(&key).await {
                sm.advance(RouteState::Delivered)?;
                tracing::debug!(task_id = %task.id, key = %key, backend = %entry.backend_id, "Cache hit");
                return Ok(RouteOutcome {
                    output: entry.payload,
                    metadata: RouteMetadata {
                        task_id: task.id.clone(),
                        backend_id: CACHED_BACKEND_ID.to_string(),
                        attempts: 0,
                        cost_usd: 0.0,
                        quality_score: entry.quality_score,
                        grounding: None,
                        verdict: Verdict::Deliver,
                        cache_hit: true,
                        low_confidence: false,
                        complexity: None,
                        selection_reason: None,
                        trail: sm.trail().to_vec(),
                        issues: Vec::new(),
                    },
                });
            }
            tracing::debug!(task_id = %task.id, key = %key, "Cache miss");
        }
        sm.advance(RouteState::Dispatching)?;

        let complexity = self.classifier.classify(task);
        let threshold = self.learning.thresholds().premium_threshold();
        let (initial, reason) = select_initial(&self.policy, &complexity, task, threshold)
            .map_err(|e| RouteError::InvalidTask(e.to_string()))?;
        tracing::debug!(
            task_id = %task.id,
            score = complexity.value,
            shape = %complexity.shape,
            backend = %initial.id,
            reason = ?reason,
            "Initial backend selected"
        );

        let mut progress = Progress::new(task);
        let mut current = self.first_available(&initial.id, &progress);
        let base_prompt = render_prompt(task);
        let mut prompt = base_prompt.clone();

        while progress.attempts < self.config.max_attempts {
            let Some(backend_id) = current.take() else {
                break;
            };
            let Some(backend) = self.backends.get(&backend_id) else {
                break;
            };
            let profile = backend.profile();

            let estimate = estimate_attempt(profile, task, &prompt);
            let estimated_cost =
                estimate.cost_usd + self.gate.verification_estimate_usd(task, estimate.tokens_out);
            if let Some(ceiling) = task.budget_ceiling_usd {
                if estimated_cost > ceiling {
                    sm.advance(RouteState::Failed)?;
                    tracing::warn!(
                        task_id = %task.id,
                        backend = %backend_id,
                        cost_usd = estimated_cost,
                        ceiling_usd = ceiling,
                        "Estimate exceeds task ceiling"
                    );
                    return Err(RouteError::BudgetExceeded(Box::new(
                        AdmissionDecision::over_task_ceiling(estimated_cost, ceiling),
                    )));
                }
            }
            let mut decision = self.budget.admit(estimated_cost).await;
            let held = match decision.reservation.take() {
                Some(reservation) if decision.allowed => self.budget.hold(reservation),
                _ => {
                    sm.advance(RouteState::Failed)?;
                    tracing::warn!(
                        task_id = %task.id,
                        backend = %backend_id,
                        cost_usd = estimated_cost,
                        reason = %decision.reason,
                        "Budget rejected attempt"
                    );
                    return Err(RouteError::BudgetExceeded(Box::new(decision)));
                }
            };

            sm.advance(RouteState::Invoking)?;
            progress.attempts += 1;
            let attempt = progress.attempts;
            let params = InvokeParams {
                system_prompt: task.system_prompt.clone(),
                max_tokens: effective_max_tokens(profile, task),
                temperature: self.config.temperature,
                timeout: self.config.backend_timeout,
            };
            let result = match tokio::time::timeout(
                self.config.backend_timeout,
                backend.invoke(&prompt, &params),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(self.config.backend_timeout)),
            };

            let generation = match result {
                Ok(generation) => generation,
                Err(e) => {
                    tracing::warn!(
                        task_id = %task.id,
                        backend = %backend_id,
                        attempt = attempt,
                        error = %e,
                        "Backend call failed"
                    );
                    self.breaker.record_failure(&backend_id);
                    if let Err(release_err) = held.release().await {
                        tracing::warn!(task_id = %task.id, error = %release_err, "Failed to release budget reservation");
                    }
                    self.record_attempt(task, attempt, &backend_id, 0.0, Verdict::Escalate, 0.0, true)
                        .await;
                    progress.failed.insert(backend_id.clone());
                    progress.last_error = Some(e.to_string());
                    sm.advance(RouteState::Escalating)?;
                    current = self.after_failure(&backend_id, &mut progress);
                    prompt = base_prompt.clone();
                    continue;
                }
            };
            self.breaker.record_success(&backend_id);

            sm.advance(RouteState::Validating)?;
            let report = self
                .gate
                .evaluate(task, &generation.text, &task.context_history)
                .await;
            let cost = estimate_cost(profile, generation.tokens_in, generation.tokens_out)
                + report.verification_cost_usd();
            if let Err(e) = held.settle(cost).await {
                tracing::warn!(task_id = %task.id, cost_usd = cost, error = %e, "Failed to commit spend");
            }
            progress.cost_usd += cost;

            let verdict = report.assessment.verdict;
            let attempts_left = progress.attempts < self.config.max_attempts;
            self.record_attempt(task, attempt, &backend_id, report.score(), verdict, cost, false)
                .await;
            tracing::debug!(
                task_id = %task.id,
                backend = %backend_id,
                attempt = attempt,
                score = report.score(),
                verdict = %verdict,
                cost_usd = cost,
                "Attempt gated"
            );
            let rephrased = (verdict == Verdict::Rephrase && attempts_left)
                .then(|| self.rephrase.rephrase(&prompt, &report));
            let candidate = Candidate {
                output: generation.text,
                backend_id: backend_id.clone(),
                report,
            };
            if verdict == Verdict::Deliver {
                progress.best = Some(candidate);
            } else {
                progress.offer(candidate);
            }

            match verdict {
                Verdict::Deliver => {
                    return self
                        .deliver(task, &key, sm, progress, complexity, reason, false)
                        .await;
                }
                Verdict::Rephrase if attempts_left => {
                    sm.advance(RouteState::Rephrasing)?;
                    tracing::debug!(
                        task_id = %task.id,
                        backend = %backend_id,
                        strategy = self.rephrase.name(),
                        "Rephrasing"
                    );
                    prompt = rephrased.unwrap_or(prompt);
                    current = Some(backend_id);
                }
                Verdict::Escalate if attempts_left => match self.next_rung(&backend_id, &progress) {
                    Some(next) => {
                        sm.advance(RouteState::Escalating)?;
                        tracing::debug!(task_id = %task.id, from = %backend_id, to = %next, "Escalating");
                        current = Some(next);
                        prompt = base_prompt.clone();
                    }
                    None => {
                        return self
                            .deliver(task, &key, sm, progress, complexity, reason, true)
                            .await;
                    }
                },
                _ => {
                    return self
                        .deliver(task, &key, sm, progress, complexity, reason, true)
                        .await;
                }
            }
        }

        self.deliver(task, &key, sm, progress, complexity, reason, true)
            .await
    }

    fn validate_task(&self, task: &Task) -> Result<(), RouteError> {
        if task.input.trim().is_empty() {
            return Err(RouteError::InvalidTask("input is empty".into()));
        }
        if let Some(forced) = &task.forced_backend {
            if !self.backends.contains(forced) {
                return Err(RouteError::InvalidTask(format!("unknown forced backend '{}'", forced)));
            }
        }
        if let Some(unknown) = task.fallback_backends.iter().find(|id| !self.backends.contains(id)) {
            return Err(RouteError::InvalidTask(format!("unknown fallback backend '{}'", unknown)));
        }
        if let Some(ceiling) = task.budget_ceiling_usd {
            if ceiling.is_nan() || ceiling < 0.0 {
                return Err(RouteError::InvalidTask("budget ceiling must be non-negative".into()));
            }
        }
        Ok(())
    }

    fn available(&self, id: &str, progress: &Progress) -> bool {
        self.backends.contains(id) && !progress.failed.contains(id) && !self.breaker.is_open(id)
    }

    /// `initial`, or the first usable rung above it.
    fn first_available(&self, initial: &str, progress: &Progress) -> Option<String> {
        if self.available(initial, progress) {
            return Some(initial.to_string());
        }
        tracing::debug!(backend = %initial, "Initial backend unavailable, moving up the ladder");
        self.next_rung(initial, progress)
    }

    fn next_rung(&self, from: &str, progress: &Progress) -> Option<String> {
        self.ladder
            .above(from)
            .iter()
            .find(|rung| self.available(&rung.id, progress))
            .map(|rung| rung.id.clone())
    }

    /// Next backend after a failed call: the task's fallback list when one
    /// was given, otherwise the ladder.
    fn after_failure(&self, failed: &str, progress: &mut Progress) -> Option<String> {
        let Some(mut queue) = progress.fallbacks.take() else {
            return self.next_rung(failed, progress);
        };
        let mut next = None;
        while let Some(candidate) = queue.pop_front() {
            if self.available(&candidate, progress) {
                next = Some(candidate);
                break;
            }
        }
        progress.fallbacks = Some(queue);
        next
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_attempt(
        &self,
        task: &Task,
        attempt: u32,
        backend_id: &str,
        quality_score: f64,
        verdict: Verdict,
        cost_usd: f64,
        backend_failed: bool,
    ) {
        self.learning
            .record(AttemptRecord {
                task_id: task.id.clone(),
                attempt_number: attempt,
                backend_id: backend_id.to_string(),
                quality_score,
                verdict,
                cost_usd,
                backend_failed,
                timestamp_ms: self.clock.now_ms(),
            })
            .await;
    }

    /// Hand back the best candidate, or fail when nothing got through a
    /// backend. Confident deliveries are cached.
    #[allow(clippy::too_many_arguments)]
    async fn deliver(
        &self,
        task: &Task,
        key: &str,
        mut sm: StateMachine,
        progress: Progress,
        complexity: ComplexityScore,
        reason: SelectionReason,
        low_confidence: bool,
    ) -> Result<RouteOutcome, RouteError> {
        let Progress {
            attempts,
            cost_usd,
            best,
            last_error,
            ..
        } = progress;

        let Some(best) = best else {
            sm.advance(RouteState::Failed)?;
            let last_error = last_error.unwrap_or_else(|| "no backend available".to_string());
            tracing::warn!(
                task_id = %task.id,
                attempts = attempts,
                error = %last_error,
                "All backends failed"
            );
            return Err(RouteError::AllBackendsFailed {
                task_id: task.id.clone(),
                attempts,
                last_error,
            });
        };
        sm.advance(RouteState::Delivered)?;
        let assessment = &best.report.assessment;

        if !low_confidence && !task.skip_cache {
            self.cache
                .put(key, best.output.clone(), &best.backend_id, assessment.score, None)
                .await;
        }

        if low_confidence {
            tracing::warn!(
                task_id = %task.id,
                backend = %best.backend_id,
                attempts = attempts,
                score = assessment.score,
                "Delivering best available output below the quality bar"
            );
        } else {
            tracing::info!(
                task_id = %task.id,
                backend = %best.backend_id,
                attempts = attempts,
                score = assessment.score,
                cost_usd = cost_usd,
                "Task delivered"
            );
        }

        Ok(RouteOutcome {
            metadata: RouteMetadata {
                task_id: task.id.clone(),
                backend_id: best.backend_id.clone(),
                attempts,
                cost_usd,
                quality_score: assessment.score,
                grounding: Some(assessment.grounding),
                verdict: assessment.verdict,
                cache_hit: false,
                low_confidence,
                complexity: Some(complexity),
                selection_reason: Some(reason),
                trail: sm.trail().to_vec(),
                issues: assessment.issues.clone(),
            },
            output: best.output,
        })
    }
}
