//! Alert de-duplication.
//!
//! One record per (severity, calendar month). An alert is sent only if no
//! alert of the same pair went out within the suppression window; sending
//! overwrites the record's timestamp.
//!
//! The overwrite is a compare-and-swap against the record that was read, so
//! router instances sharing a store agree on a single sender.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::notify::AlertLevel;
use crate::store::{Store, StoreError};

/// Persisted record of the last alert sent for a (level, period) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub level: AlertLevel,
    pub period_key: String,
    pub last_sent_at: DateTime<Utc>,
}

/// Store-backed suppression of repeat alerts.
pub struct AlertDeduplicator {
    store: Arc<dyn Store>,
    window: Duration,
}

impl AlertDeduplicator {
    pub fn new(store: Arc<dyn Store>, window: Duration) -> Self {
        Self { store, window }
    }

    fn key(level: AlertLevel, period_key: &str) -> String {
        format!("alert:{}:{}", level, period_key)
    }

    /// Decide whether to send, recording the send if so.
    pub async fn should_send(
        &self,
        level: AlertLevel,
        period_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let key = Self::key(level, period_key);

        let previous = self.store.get(&key).await?;
        if let Some(value) = &previous {
            let record: AlertRecord = serde_json::from_value(value.clone())?;
            let elapsed = now.signed_duration_since(record.last_sent_at);
            let suppressed = elapsed
                .to_std()
                .map(|e| e < self.window)
                // last_sent_at in the future: clock went backwards, keep suppressing
                .unwrap_or(true);
            if suppressed {
                tracing::debug!(level = %level, period = period_key, "Alert suppressed");
                return Ok(false);
            }
        }

        let record = AlertRecord {
            level,
            period_key: period_key.to_string(),
            last_sent_at: now,
        };
        let sent = self
            .store
            .compare_and_swap(&key, previous.as_ref(), serde_json::to_value(&record)?)
            .await?;
        if !sent {
            tracing::debug!(level = %level, period = period_key, "Alert claimed by another sender");
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn dedup() -> (AlertDeduplicator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            AlertDeduplicator::new(store.clone(), Duration::from_secs(3600)),
            store,
        )
    }

    #[tokio::test]
    async fn test_second_alert_within_hour_suppressed() {
        let (dedup, _) = dedup();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

        assert!(dedup.should_send(AlertLevel::Warning, "2025-03", t0).await.unwrap());
        let t1 = t0 + chrono::Duration::minutes(59);
        assert!(!dedup.should_send(AlertLevel::Warning, "2025-03", t1).await.unwrap());
        let t2 = t0 + chrono::Duration::minutes(61);
        assert!(dedup.should_send(AlertLevel::Warning, "2025-03", t2).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_store_sends_once() {
        let store = Arc::new(MemoryStore::new());
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = AlertDeduplicator::new(store.clone(), Duration::from_secs(3600));
                tokio::spawn(async move {
                    dedup
                        .should_send(AlertLevel::Emergency, "2025-03", t0)
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut sent = 0;
        for h in handles {
            if h.await.unwrap() {
                sent += 1;
            }
        }
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn test_record_written_by_one_instance_suppresses_another() {
        let store = Arc::new(MemoryStore::new());
        let first = AlertDeduplicator::new(store.clone(), Duration::from_secs(3600));
        let second = AlertDeduplicator::new(store.clone(), Duration::from_secs(3600));
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

        assert!(first.should_send(AlertLevel::Warning, "2025-03", t0).await.unwrap());
        assert!(!second.should_send(AlertLevel::Warning, "2025-03", t0).await.unwrap());
        let later = t0 + chrono::Duration::minutes(61);
        assert!(second.should_send(AlertLevel::Warning, "2025-03", later).await.unwrap());
        assert!(!first.should_send(AlertLevel::Warning, "2025-03", later).await.unwrap());
    }

    #[tokio::test]
    async fn test_levels_and_months_independent() {
        let (dedup, store) = dedup();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

        assert!(dedup.should_send(AlertLevel::Warning, "2025-03", t0).await.unwrap());
        assert!(dedup.should_send(AlertLevel::Critical, "2025-03", t0).await.unwrap());
        assert!(dedup.should_send(AlertLevel::Warning, "2025-04", t0).await.unwrap());
        assert!(store.get("alert:critical:2025-03").await.unwrap().is_some());
    }
}
