//! # tollgate-runtime
//!
//! Async side of the tollgate router.
//!
//! `tollgate-core` decides how hard a task is, what it should cost and
//! whether an output is good enough. This crate does the parts that wait on
//! the world: invoking backends, enforcing spend across time windows,
//! verifying claims, caching deliveries, and learning from outcomes.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`router`] | Per-task state machine: cache, select, admit, invoke, gate, escalate |
//! | [`resilience`] | Budget guardrail, alert de-duplication, circuit breaker, escalation ladder |
//! | [`gate`] / [`grounding`] | Quality gate with async claim verification |
//! | [`cache`] | TTL response cache with a periodic sweep |
//! | [`learning`] | Attempt log, per-backend metrics, threshold recommendations |
//! | [`backends`] | `Backend` seam, registry, factories (Anthropic behind a feature) |
//! | [`store`] / [`notify`] | Persistence and alert-delivery seams |
//!
//! ## Example
//!
//! ```rust,ignore
//! use tollgate_core::{RoutingPolicy, Task, TaskKind};
//! use tollgate_runtime::{BackendRegistry, Router};
//!
//! let policy = RoutingPolicy::from_file("policy.yaml")?;
//! let backends = BackendRegistry::new().with(economy).with(premium);
//! let router = Router::builder(policy, backends).build()?;
//! let _background = router.spawn_background();
//!
//! match router.submit(Task::new("t-1", TaskKind::Generation, "Draft the launch note")).await {
//!     Ok(outcome) => println!("{} via {}", outcome.output, outcome.metadata.backend_id),
//!     Err(e) => eprintln!("{} (retriable: {})", e.code, e.retriable),
//! }
//! ```

pub mod backends;
pub mod cache;
pub mod config;
pub mod gate;
pub mod grounding;
pub mod learning;
pub mod notify;
pub mod prompts;
pub mod resilience;
pub mod router;
pub mod secrets;
pub mod store;

pub use backends::{
    Backend, BackendError, BackendFactory, BackendFactoryRegistry, BackendRegistry, Generation,
    InvokeParams,
};
#[cfg(feature = "anthropic")]
pub use backends::{AnthropicBackend, AnthropicBackendFactory};
pub use cache::{CacheEntry, CacheStats, ResponseCache};
pub use config::{AlertConfig, CacheConfig, ConfigError, LearningConfig, RuntimeConfig};
pub use gate::{GateReport, OutputGate, QualityGate};
pub use grounding::{
    BackendVerifier, ClaimVerifier, GroundingChecker, GroundingError, GroundingReport, LexicalVerifier,
};
pub use learning::{
    AttemptLog, BackendMetric, LearningLoop, LearningReport, Recommendation, RoutingThresholds,
};
pub use notify::{Alert, AlertLevel, ChannelNotifier, Notifier, NotifyError, TracingNotifier};
pub use resilience::{
    AdmissionDecision, BudgetError, BudgetGuardrail, BudgetScope, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, EscalationLadder, HeldReservation, LimitBreach, LimitScope,
    Reservation, WindowStatus,
};
pub use router::{
    AppendCorrections, BackgroundTasks, ErrorCode, RephraseStrategy, RouteError, RouteMetadata,
    RouteOutcome, RouteState, Router, RouterBuilder, SubmitError,
};
pub use secrets::{AdminCredential, ApiCredential, CredentialError, CredentialOrigin};
pub use store::{MemoryStore, Store, StoreError, StoreFilter};
