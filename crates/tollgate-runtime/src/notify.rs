//! Alert notification seam.
//!
//! Notification delivery is fire-and-forget: [`dispatch`] hands the alert
//! to a spawned task that retries with exponential backoff and logs the
//! final failure. The router never waits on a notifier.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Severity of a budget alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
            AlertLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification about budget pressure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,

    /// Calendar month the alert belongs to (`YYYY-MM`)
    pub period_key: String,

    /// Projected monthly utilization that triggered the alert
    pub monthly_percentage: f64,
}

/// Errors from a notifier.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification channel closed")]
    Closed,
}

/// Sink for alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        tracing::warn!(
            level = %alert.level,
            period = %alert.period_key,
            monthly_pct = alert.monthly_percentage,
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// Forwards alerts into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelNotifier {
    /// A notifier and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.tx.send(alert.clone()).map_err(|_| NotifyError::Closed)
    }
}

/// Deliver an alert in the background with bounded retries.
pub fn dispatch(notifier: Arc<dyn Notifier>, alert: Alert, retries: usize) -> JoinHandle<()> {
    tokio::spawn(async move {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(retries);

        let send = || {
            let notifier = Arc::clone(&notifier);
            let alert = alert.clone();
            async move { notifier.send(&alert).await }
        };

        let result = send
            .retry(backoff)
            .notify(|err: &NotifyError, after: Duration| {
                tracing::debug!(error = %err, retry_in = ?after, "Retrying alert delivery");
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(level = %alert.level, error = %e, "Alert delivery failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn alert() -> Alert {
        Alert {
            level: AlertLevel::Critical,
            message: "Monthly budget at 86%".to_string(),
            period_key: "2025-03".to_string(),
            monthly_percentage: 86.0,
        }
    }

    /// Fails a fixed number of times before succeeding.
    struct FlakyNotifier {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(NotifyError::Delivery("smtp down".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(AlertLevel::Warning < AlertLevel::Critical);
        assert!(AlertLevel::Critical < AlertLevel::Emergency);
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new();
        dispatch(Arc::new(notifier), alert(), 0).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), alert());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_retries_until_success() {
        let flaky = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        dispatch(flaky.clone(), alert(), 3).await.unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_gives_up() {
        let flaky = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        dispatch(flaky.clone(), alert(), 2).await.unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }
}
