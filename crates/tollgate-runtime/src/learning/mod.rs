//! Learning loop.
//!
//! Every router attempt lands here as an [`AttemptRecord`]. The loop keeps a
//! bounded ring of recent attempts (oldest evicted first), running
//! per-backend figures over every attempt since start, and mirrors each
//! attempt to the store. Periodically the ring and the running figures become
//! a [`LearningReport`] and a list of [`Recommendation`]s.
//!
//! Recommendations are logged. With `auto_tune` enabled, premium-threshold
//! adjustments are also written to the shared [`RoutingThresholds`] the
//! router reads on every selection; other recommendations stay advisory.

mod metrics;
mod recommend;

pub use metrics::{backend_metrics, summarize, BackendMetric, LearningReport};
pub use recommend::{recommend, Recommendation, THRESHOLD_MAX, THRESHOLD_MIN, THRESHOLD_STEP};

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tollgate_core::AttemptRecord;

use crate::config::LearningConfig;
use crate::store::Store;
use metrics::summarize_outcomes;

/// Thresholds the router reads at selection time.
#[derive(Debug)]
pub struct RoutingThresholds {
    premium: RwLock<f64>,
}

impl RoutingThresholds {
    pub fn new(premium_threshold: f64) -> Self {
        Self {
            premium: RwLock::new(premium_threshold),
        }
    }

    pub fn premium_threshold(&self) -> f64 {
        *self.premium.read()
    }

    /// Set the premium threshold, clamped to the tunable range.
    pub fn set_premium_threshold(&self, value: f64) {
        *self.premium.write() = value.clamp(THRESHOLD_MIN, THRESHOLD_MAX);
    }
}

/// Fixed-capacity ring of recent attempts, oldest evicted first.
#[derive(Debug)]
pub struct AttemptLog {
    capacity: usize,
    records: Mutex<VecDeque<AttemptRecord>>,
}

impl AttemptLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, record: AttemptRecord) {
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Copy of the ring, oldest first.
    pub fn snapshot(&self) -> Vec<AttemptRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Attempt log with periodic analysis.
pub struct LearningLoop {
    config: LearningConfig,
    log: AttemptLog,
    backends: Mutex<BTreeMap<String, BackendMetric>>,
    thresholds: Arc<RoutingThresholds>,
    store: Option<Arc<dyn Store>>,
}

impl LearningLoop {
    pub fn new(config: LearningConfig, thresholds: Arc<RoutingThresholds>) -> Self {
        Self {
            log: AttemptLog::new(config.capacity),
            backends: Mutex::new(BTreeMap::new()),
            config,
            thresholds,
            store: None,
        }
    }

    /// Mirror attempts to a store under `attempt:{task_id}:{seq}`, where
    /// `seq` counts every attempt recorded for that task id (resubmissions
    /// included), zero-padded so keys sort in recording order.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn thresholds(&self) -> &Arc<RoutingThresholds> {
        &self.thresholds
    }

    /// Append an attempt to the log, the running figures and the store.
    pub async fn record(&self, record: AttemptRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = Self::persist(store.as_ref(), &record).await {
                tracing::warn!(task_id = %record.task_id, error = %e, "Failed to persist attempt record");
            }
        }
        self.backends
            .lock()
            .entry(record.backend_id.clone())
            .or_insert_with(|| BackendMetric::new(&record.backend_id))
            .observe(&record, self.config.success_threshold);
        self.log.push(record);
    }

    async fn persist(store: &dyn Store, record: &AttemptRecord) -> Result<(), crate::store::StoreError> {
        let value = serde_json::to_value(record)?;
        let seq = store
            .increment(&format!("attempt_seq:{}", record.task_id), 1.0)
            .await?;
        let key = format!("attempt:{}:{:06}", record.task_id, seq as u64);
        store.put(&key, value).await
    }

    /// Running figures per backend, ordered by backend id.
    pub fn backend_metrics(&self) -> Vec<BackendMetric> {
        self.backends.lock().values().cloned().collect()
    }

    pub fn log(&self) -> &AttemptLog {
        &self.log
    }

    pub fn snapshot(&self) -> Vec<AttemptRecord> {
        self.log.snapshot()
    }

    /// Rates over the ring; per-backend figures over every attempt recorded.
    pub fn report(&self) -> LearningReport {
        let mut report = summarize_outcomes(&self.snapshot(), self.config.success_threshold);
        report.backends = self.backend_metrics();
        report
    }

    pub fn recommend(&self) -> Vec<Recommendation> {
        recommend(
            &self.report(),
            self.thresholds.premium_threshold(),
            self.config.min_samples,
        )
    }

    /// Apply threshold recommendations when auto-tuning. Returns how many
    /// were applied.
    pub fn apply(&self, recommendations: &[Recommendation]) -> usize {
        if !self.config.auto_tune {
            return 0;
        }
        let mut applied = 0;
        for rec in recommendations {
            if let Recommendation::AdjustPremiumThreshold { from, to } = rec {
                self.thresholds.set_premium_threshold(*to);
                tracing::info!(from = from, to = to, "Premium threshold tuned");
                applied += 1;
            }
        }
        applied
    }

    /// One analysis pass: log the report and recommendations, then apply.
    pub fn tick(&self) -> Vec<Recommendation> {
        let report = self.report();
        tracing::info!(
            attempts = report.attempts,
            tasks = report.tasks,
            success_rate = report.success_rate,
            escalation_rate = report.escalation_rate,
            avg_cost_usd = report.avg_cost_usd,
            "Learning report"
        );
        let recs = recommend(
            &report,
            self.thresholds.premium_threshold(),
            self.config.min_samples,
        );
        for rec in &recs {
            tracing::info!(recommendation = %rec, "Routing recommendation");
        }
        self.apply(&recs);
        recs
    }

    /// Run [`tick`](Self::tick) on the configured interval until aborted.
    pub fn spawn_periodic(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.tick();
            }
        })
    }
}
