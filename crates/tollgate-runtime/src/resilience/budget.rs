//! Budget guardrail.
//!
//! Admission control over three calendar-aligned UTC windows (hour, day,
//! month) plus a fixed per-request ceiling.
//!
//! ## Admission order
//!
//! | Check | Rejects when | Alert level |
//! |-------|--------------|-------------|
//! | per-request ceiling | `estimate > ceiling` | critical |
//! | month | `spent + reserved + estimate >= limit` | emergency (notifies) |
//! | day | `spent + reserved + estimate >= limit` | critical |
//! | hour | `spent + reserved + estimate >= limit` | warning |
//!
//! Admitted requests still notify when projected monthly utilization
//! crosses the 70/85/95% thresholds, de-duplicated per (level, month).
//!
//! ## Reservations
//!
//! Admission adds the estimate to `budget:{scope}:{window}:reserved` with an
//! atomic increment and checks the limit against the value it got back, so
//! requests in flight at the same time (in this process or in another one
//! sharing the store) see each other's estimates. A rejected admission rolls
//! its increments back. An admitted request holds a [`Reservation`] until
//! [`BudgetGuardrail::settle`] moves it into spend at the actual cost, or
//! [`BudgetGuardrail::release`] drops it after a failed call.
//!
//! Committed spend lives under `budget:{scope}:{window}:spent` and is only
//! changed through `settle`, [`BudgetGuardrail::commit`] or an authorized
//! [`BudgetGuardrail::override_reset`]. A store failure during admission
//! rejects the request.

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, Months, NaiveDate, NaiveTime, TimeZone, Timelike,
    Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tollgate_core::{BudgetLimits, Clock, SystemClock};

use super::alerts::AlertDeduplicator;
use crate::config::AlertConfig;
use crate::notify::{dispatch, Alert, AlertLevel, Notifier, TracingNotifier};
use crate::secrets::AdminCredential;
use crate::store::{Store, StoreError};

/// A budget window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    Hour,
    Day,
    Month,
}

impl BudgetScope {
    pub const ALL: [BudgetScope; 3] = [BudgetScope::Hour, BudgetScope::Day, BudgetScope::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetScope::Hour => "hour",
            BudgetScope::Day => "day",
            BudgetScope::Month => "month",
        }
    }

    fn index(&self) -> usize {
        match self {
            BudgetScope::Hour => 0,
            BudgetScope::Day => 1,
            BudgetScope::Month => 2,
        }
    }

    /// The configured hard limit for this scope.
    pub fn limit(&self, limits: &BudgetLimits) -> f64 {
        match self {
            BudgetScope::Hour => limits.hourly_limit_usd,
            BudgetScope::Day => limits.daily_limit_usd,
            BudgetScope::Month => limits.monthly_limit_usd,
        }
    }

    fn rejection_level(&self) -> AlertLevel {
        match self {
            BudgetScope::Hour => AlertLevel::Warning,
            BudgetScope::Day => AlertLevel::Critical,
            BudgetScope::Month => AlertLevel::Emergency,
        }
    }

    /// The window containing `now`.
    pub fn window(&self, now: DateTime<Utc>) -> BudgetWindow {
        let date = now.date_naive();
        let (start, end, key) = match self {
            BudgetScope::Hour => {
                let hour = NaiveTime::from_hms_opt(now.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
                let start = Utc.from_utc_datetime(&date.and_time(hour));
                (start, start + ChronoDuration::hours(1), start.format("%Y-%m-%dT%H").to_string())
            }
            BudgetScope::Day => {
                let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
                (start, start + ChronoDuration::days(1), start.format("%Y-%m-%d").to_string())
            }
            BudgetScope::Month => {
                let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
                let next = first
                    .checked_add_months(Months::new(1))
                    .unwrap_or(first + ChronoDuration::days(31));
                let start = Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN));
                let end = Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN));
                (start, end, start.format("%Y-%m").to_string())
            }
        };
        BudgetWindow {
            scope: *self,
            key,
            start,
            end,
        }
    }
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete window of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetWindow {
    pub scope: BudgetScope,
    pub key: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BudgetWindow {
    fn spent_key(&self) -> String {
        format!("budget:{}:{}:spent", self.scope, self.key)
    }

    fn reserved_key(&self) -> String {
        format!("budget:{}:{}:reserved", self.scope, self.key)
    }

    fn state_key(&self) -> String {
        format!("budget:{}:{}", self.scope, self.key)
    }

    fn resets_in_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.end - now).num_seconds().max(0)
    }
}

/// Persisted state of one budget window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub scope: BudgetScope,
    pub window_key: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub spent_usd: f64,
    pub limit_usd: f64,
}

/// Which limit a request ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// The task's own budget ceiling
    Task,
    /// The policy's fixed per-request ceiling
    PerRequest,
    Hour,
    Day,
    Month,
}

impl From<BudgetScope> for LimitScope {
    fn from(scope: BudgetScope) -> Self {
        match scope {
            BudgetScope::Hour => LimitScope::Hour,
            BudgetScope::Day => LimitScope::Day,
            BudgetScope::Month => LimitScope::Month,
        }
    }
}

/// Remaining-budget detail attached to a rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitBreach {
    pub scope: LimitScope,
    pub spent_usd: f64,
    pub limit_usd: f64,
    pub remaining_usd: f64,

    /// Seconds until the window rolls over (none for ceilings)
    pub resets_in_secs: Option<i64>,
}

/// Outcome of [`BudgetGuardrail::admit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: String,
    pub alert_level: Option<AlertLevel>,
    pub breach: Option<LimitBreach>,

    /// `(spent + reserved + estimate) / monthly limit * 100`
    pub monthly_percentage: f64,
    pub estimated_cost_usd: f64,

    /// Held estimate of an admitted request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
}

impl AdmissionDecision {
    fn admitted(reservation: Reservation, monthly_percentage: f64, alert_level: Option<AlertLevel>) -> Self {
        Self {
            allowed: true,
            reason: "within budget".to_string(),
            alert_level,
            breach: None,
            monthly_percentage,
            estimated_cost_usd: reservation.amount_usd,
            reservation: Some(reservation),
        }
    }

    fn rejected(
        estimate: f64,
        monthly_percentage: f64,
        level: AlertLevel,
        reason: String,
        breach: Option<LimitBreach>,
    ) -> Self {
        Self {
            allowed: false,
            reason,
            alert_level: Some(level),
            breach,
            monthly_percentage,
            estimated_cost_usd: estimate,
            reservation: None,
        }
    }

    /// Rejection for a task's own ceiling.
    pub fn over_task_ceiling(estimate: f64, ceiling: f64) -> Self {
        Self::rejected(
            estimate,
            0.0,
            AlertLevel::Critical,
            format!(
                "estimated cost ${:.4} exceeds task budget ceiling ${:.4}",
                estimate, ceiling
            ),
            Some(LimitBreach {
                scope: LimitScope::Task,
                spent_usd: 0.0,
                limit_usd: ceiling,
                remaining_usd: ceiling,
                resets_in_secs: None,
            }),
        )
    }
}

/// Estimated spend held in every window while a request is in flight.
///
/// Settling or releasing uses the windows the estimate was reserved in,
/// even when the clock has since rolled into the next hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub amount_usd: f64,
    windows: Vec<BudgetWindow>,
}

/// A [`Reservation`] bound to its guardrail.
///
/// Dropping it unsettled releases the estimate on a background task, so a
/// cancelled request does not keep budget held until its windows roll over.
pub struct HeldReservation {
    guardrail: Arc<BudgetGuardrail>,
    reservation: Option<Reservation>,
}

impl HeldReservation {
    pub fn amount_usd(&self) -> f64 {
        self.reservation.as_ref().map_or(0.0, |r| r.amount_usd)
    }

    /// Replace the estimate with the actual cost.
    pub async fn settle(mut self, cost: f64) -> Result<(), BudgetError> {
        match self.reservation.take() {
            Some(reservation) => self.guardrail.settle(reservation, cost).await,
            None => Ok(()),
        }
    }

    /// Give the estimate back without recording spend.
    pub async fn release(mut self) -> Result<(), BudgetError> {
        match self.reservation.take() {
            Some(reservation) => self.guardrail.release(reservation).await,
            None => Ok(()),
        }
    }
}

impl Drop for HeldReservation {
    fn drop(&mut self) {
        let Some(reservation) = self.reservation.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let guardrail = Arc::clone(&self.guardrail);
                handle.spawn(async move {
                    if let Err(e) = guardrail.release(reservation).await {
                        tracing::warn!(error = %e, "Failed to release abandoned budget reservation");
                    }
                });
            }
            Err(_) => tracing::warn!(
                amount_usd = reservation.amount_usd,
                "Budget reservation dropped outside a runtime, held until its windows roll over"
            ),
        }
    }
}

/// Usage of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub scope: BudgetScope,
    pub window_key: String,
    pub spent_usd: f64,

    /// Estimates of requests still in flight
    pub reserved_usd: f64,
    pub limit_usd: f64,
    pub remaining_usd: f64,
    pub utilization_pct: f64,
    pub resets_in_secs: i64,
}

/// Errors from guardrail operations other than admission.
#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Override token rejected")]
    Unauthorized,

    #[error("Budget override is not configured")]
    OverrideDisabled,

    #[error("Budget store error: {0}")]
    Store(#[from] StoreError),
}

/// Multi-window budget enforcement.
pub struct BudgetGuardrail {
    limits: BudgetLimits,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    dedup: AlertDeduplicator,
    notify_retries: usize,
    admin: Option<AdminCredential>,
    // hour, day, month
    locks: [Mutex<()>; 3],
    alerts_dispatched: AtomicU64,
}

impl BudgetGuardrail {
    pub fn new(limits: BudgetLimits, store: Arc<dyn Store>) -> Self {
        let alerts = AlertConfig::default();
        Self {
            limits,
            dedup: AlertDeduplicator::new(Arc::clone(&store), alerts.suppression_window),
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            notify_retries: alerts.notify_retries,
            admin: None,
            locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
            alerts_dispatched: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_alert_config(mut self, config: &AlertConfig) -> Self {
        self.dedup = AlertDeduplicator::new(Arc::clone(&self.store), config.suppression_window);
        self.notify_retries = config.notify_retries;
        self
    }

    /// Enable the administrative override.
    pub fn with_admin(mut self, admin: AdminCredential) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    /// Alerts handed to the notifier so far.
    pub fn alerts_dispatched(&self) -> u64 {
        self.alerts_dispatched.load(Ordering::Relaxed)
    }

    async fn read_amount(&self, key: String) -> Result<f64, StoreError> {
        let record = self.store.get(&key).await?;
        match record {
            Some(value) => value.as_f64().ok_or(StoreError::NotNumeric(key)),
            None => Ok(0.0),
        }
    }

    async fn spent(&self, window: &BudgetWindow) -> Result<f64, StoreError> {
        self.read_amount(window.spent_key()).await
    }

    /// Take back `amount` from the reserved counters of `windows`.
    async fn unreserve(&self, windows: &[BudgetWindow], amount: f64) -> Result<(), StoreError> {
        let mut first_error = None;
        for window in windows {
            if let Err(e) = self.store.increment(&window.reserved_key(), -amount).await {
                tracing::warn!(scope = %window.scope, window = %window.key, error = %e, "Failed to release reservation");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn unavailable(estimate: f64, e: &StoreError) -> AdmissionDecision {
        tracing::warn!(error = %e, "Budget store unavailable, rejecting");
        AdmissionDecision::rejected(
            estimate,
            0.0,
            AlertLevel::Critical,
            format!("budget store unavailable: {}", e),
            None,
        )
    }

    /// Decide whether a request estimated at `estimate` USD may proceed.
    ///
    /// An admitted decision carries a [`Reservation`] holding the estimate;
    /// hand it to [`settle`](Self::settle) or [`release`](Self::release).
    pub async fn admit(&self, estimate: f64) -> AdmissionDecision {
        let now = self.clock.now();
        let windows = BudgetScope::ALL.map(|scope| scope.window(now));
        let month = &windows[BudgetScope::Month.index()];
        let monthly_limit = self.limits.monthly_limit_usd;

        let ceiling = self.limits.per_request_ceiling_usd;
        if estimate > ceiling {
            let month_spent = match self.spent(month).await {
                Ok(value) => value,
                Err(e) => return Self::unavailable(estimate, &e),
            };
            tracing::warn!(cost_usd = estimate, ceiling, "Request over per-request ceiling");
            return AdmissionDecision::rejected(
                estimate,
                (month_spent + estimate) / monthly_limit * 100.0,
                AlertLevel::Critical,
                format!(
                    "estimated cost ${:.4} exceeds per-request ceiling ${:.2}",
                    estimate, ceiling
                ),
                Some(LimitBreach {
                    scope: LimitScope::PerRequest,
                    spent_usd: 0.0,
                    limit_usd: ceiling,
                    remaining_usd: ceiling,
                    resets_in_secs: None,
                }),
            );
        }

        let mut held: Vec<BudgetWindow> = Vec::with_capacity(3);
        let mut month_projected = 0.0;
        for scope in [BudgetScope::Month, BudgetScope::Day, BudgetScope::Hour] {
            let window = &windows[scope.index()];
            // reserve before reading spend: a concurrent settle adds spend
            // before it removes its reservation, so the sum never undercounts
            let reserved = match self.store.increment(&window.reserved_key(), estimate).await {
                Ok(value) => value,
                Err(e) => {
                    let _ = self.unreserve(&held, estimate).await;
                    return Self::unavailable(estimate, &e);
                }
            };
            held.push(window.clone());
            let spent = match self.spent(window).await {
                Ok(value) => value,
                Err(e) => {
                    let _ = self.unreserve(&held, estimate).await;
                    return Self::unavailable(estimate, &e);
                }
            };

            let projected = spent + reserved;
            let already = projected - estimate;
            if scope == BudgetScope::Month {
                month_projected = projected;
            }
            let limit = scope.limit(&self.limits);
            if projected < limit {
                continue;
            }

            if let Err(e) = self.unreserve(&held, estimate).await {
                tracing::warn!(error = %e, "Rejected admission left a reservation behind");
            }
            let monthly_percentage = month_projected / monthly_limit * 100.0;
            let level = scope.rejection_level();
            tracing::warn!(
                scope = %scope,
                window = %window.key,
                spent,
                in_flight = already - spent,
                limit,
                cost_usd = estimate,
                level = %level,
                "Budget admission rejected"
            );
            if scope == BudgetScope::Month {
                let message = format!(
                    "Monthly budget exhausted: ${:.2} spent of ${:.2}, request blocked",
                    already, limit
                );
                self.raise(level, month, monthly_percentage, message).await;
            }
            return AdmissionDecision::rejected(
                estimate,
                monthly_percentage,
                level,
                format!(
                    "{} budget exceeded: ${:.2} spent + ${:.4} estimated >= ${:.2} limit",
                    match scope {
                        BudgetScope::Hour => "hourly",
                        BudgetScope::Day => "daily",
                        BudgetScope::Month => "monthly",
                    },
                    already,
                    estimate,
                    limit
                ),
                Some(LimitBreach {
                    scope: scope.into(),
                    spent_usd: already,
                    limit_usd: limit,
                    remaining_usd: (limit - already).max(0.0),
                    resets_in_secs: Some(window.resets_in_secs(now)),
                }),
            );
        }

        let monthly_percentage = month_projected / monthly_limit * 100.0;
        let thresholds = &self.limits.alert_thresholds;
        let level = if monthly_percentage >= thresholds.emergency {
            Some(AlertLevel::Emergency)
        } else if monthly_percentage >= thresholds.critical {
            Some(AlertLevel::Critical)
        } else if monthly_percentage >= thresholds.warning {
            Some(AlertLevel::Warning)
        } else {
            None
        };

        if let Some(level) = level {
            let message = format!(
                "Monthly budget at {:.1}% (${:.2} of ${:.2})",
                monthly_percentage, month_projected, monthly_limit
            );
            self.raise(level, month, monthly_percentage, message).await;
        }

        let reservation = Reservation {
            amount_usd: estimate,
            windows: held,
        };
        AdmissionDecision::admitted(reservation, monthly_percentage, level)
    }

    /// Tie a reservation to this guardrail so dropping it releases it.
    pub fn hold(self: &Arc<Self>, reservation: Reservation) -> HeldReservation {
        HeldReservation {
            guardrail: Arc::clone(self),
            reservation: Some(reservation),
        }
    }

    /// Send an alert unless one of the same level went out recently.
    async fn raise(&self, level: AlertLevel, month: &BudgetWindow, monthly_percentage: f64, message: String) {
        match self.dedup.should_send(level, &month.key, self.clock.now()).await {
            Ok(true) => {
                self.alerts_dispatched.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(level = %level, period = %month.key, "Budget alert emitted");
                dispatch(
                    Arc::clone(&self.notifier),
                    Alert {
                        level,
                        message,
                        period_key: month.key.clone(),
                        monthly_percentage,
                    },
                    self.notify_retries,
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(level = %level, error = %e, "Alert record unavailable, alert dropped");
            }
        }
    }

    /// Record spend that was never reserved. Non-positive amounts are ignored.
    pub async fn commit(&self, cost: f64) -> Result<(), BudgetError> {
        if cost.is_nan() || cost <= 0.0 {
            return Ok(());
        }
        let now = self.clock.now();
        for scope in BudgetScope::ALL {
            self.add_spend(&scope.window(now), cost).await?;
        }
        tracing::debug!(cost_usd = cost, "Budget spend committed");
        Ok(())
    }

    async fn add_spend(&self, window: &BudgetWindow, cost: f64) -> Result<(), StoreError> {
        let _guard = self.locks[window.scope.index()].lock().await;
        let spent = self.store.increment(&window.spent_key(), cost).await?;
        self.write_state(window, spent).await
    }

    /// Record the actual cost of an admitted request and drop its
    /// reservation.
    ///
    /// Spend is added before the reservation is removed. The reservation is
    /// removed even when recording spend fails.
    pub async fn settle(&self, reservation: Reservation, cost: f64) -> Result<(), BudgetError> {
        let mut recorded = Ok(());
        if cost.is_finite() && cost > 0.0 {
            for window in &reservation.windows {
                if let Err(e) = self.add_spend(window, cost).await {
                    recorded = Err(e);
                    break;
                }
            }
        }
        let released = self.unreserve(&reservation.windows, reservation.amount_usd).await;
        tracing::debug!(
            cost_usd = cost,
            reserved_usd = reservation.amount_usd,
            "Budget reservation settled"
        );
        recorded?;
        released?;
        Ok(())
    }

    /// Drop a reservation without recording spend.
    pub async fn release(&self, reservation: Reservation) -> Result<(), BudgetError> {
        self.unreserve(&reservation.windows, reservation.amount_usd).await?;
        tracing::debug!(reserved_usd = reservation.amount_usd, "Budget reservation released");
        Ok(())
    }

    async fn write_state(&self, window: &BudgetWindow, spent: f64) -> Result<(), StoreError> {
        let state = BudgetState {
            scope: window.scope,
            window_key: window.key.clone(),
            window_start: window.start,
            window_end: window.end,
            spent_usd: spent,
            limit_usd: window.scope.limit(&self.limits),
        };
        self.store
            .put(&window.state_key(), serde_json::to_value(&state)?)
            .await
    }

    /// Usage of the current window of every scope.
    pub async fn status(&self) -> Result<Vec<WindowStatus>, BudgetError> {
        let now = self.clock.now();
        let mut out = Vec::with_capacity(3);
        for scope in BudgetScope::ALL {
            let window = scope.window(now);
            let spent = self.spent(&window).await?;
            let reserved = self.read_amount(window.reserved_key()).await?.max(0.0);
            let limit = scope.limit(&self.limits);
            out.push(WindowStatus {
                scope,
                window_key: window.key.clone(),
                spent_usd: spent,
                reserved_usd: reserved,
                limit_usd: limit,
                remaining_usd: (limit - spent - reserved).max(0.0),
                utilization_pct: spent / limit * 100.0,
                resets_in_secs: window.resets_in_secs(now),
            });
        }
        Ok(out)
    }

    /// Reset the current window of `scope` to zero spend.
    ///
    /// The only way to unblock an exhausted month before it rolls over.
    pub async fn override_reset(&self, scope: BudgetScope, token: &str) -> Result<(), BudgetError> {
        let admin = self.admin.as_ref().ok_or(BudgetError::OverrideDisabled)?;
        if !admin.verify(token) {
            tracing::warn!(scope = %scope, "Budget override rejected");
            return Err(BudgetError::Unauthorized);
        }

        let window = scope.window(self.clock.now());
        let _guard = self.locks[scope.index()].lock().await;
        self.store.put(&window.spent_key(), serde_json::Value::from(0.0)).await?;
        self.write_state(&window, 0.0).await?;
        tracing::warn!(scope = %scope, window = %window.key, "Budget override applied, spend reset");
        Ok(())
    }
}
