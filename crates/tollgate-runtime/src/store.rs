//! Key-value store seam.
//!
//! Budget spend, alert records and the attempt log are persisted through
//! [`Store`]. Pointing several router instances at one shared store makes
//! budget enforcement correct across instances; [`MemoryStore`] is the
//! single-process default.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

/// Errors from a store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record at '{0}' is not numeric")]
    NotNumeric(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Selects records for [`Store::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreFilter {
    /// Only keys starting with this prefix
    pub prefix: String,

    /// At most this many records (in key order)
    pub limit: Option<usize>,
}

impl StoreFilter {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persistent key-value storage.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a record.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a record, replacing any previous value.
    async fn put(&self, key: &str, record: Value) -> Result<(), StoreError>;

    /// Atomically add `amount` to a numeric record (missing counts as zero)
    /// and return the new value.
    async fn increment(&self, key: &str, amount: f64) -> Result<f64, StoreError>;

    /// Write `record` only if the key currently holds `expected` (`None`
    /// meaning absent). Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        record: Value,
    ) -> Result<bool, StoreError>;

    /// Records matching a filter, ordered by key.
    async fn query(&self, filter: &StoreFilter) -> Result<Vec<(String, Value)>, StoreError>;
}

/// In-process store over a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn put(&self, key: &str, record: Value) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    async fn increment(&self, key: &str, amount: f64) -> Result<f64, StoreError> {
        // The entry guard holds the shard lock for the read-modify-write.
        let mut entry = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| Value::from(0.0));
        let current = entry
            .as_f64()
            .ok_or_else(|| StoreError::NotNumeric(key.to_string()))?;
        let next = current + amount;
        *entry = Value::from(next);
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        record: Value,
    ) -> Result<bool, StoreError> {
        match (self.records.entry(key.to_string()), expected) {
            (Entry::Vacant(slot), None) => {
                slot.insert(record);
                Ok(true)
            }
            (Entry::Occupied(mut slot), Some(expected)) if slot.get() == expected => {
                slot.insert(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn query(&self, filter: &StoreFilter) -> Result<Vec<(String, Value)>, StoreError> {
        let mut rows: Vec<(String, Value)> = self
            .records
            .iter()
            .filter(|r| r.key().starts_with(&filter.prefix))
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_put() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());
        store.put("a", json!({"x": 1})).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_increment_from_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("spent", 1.5).await.unwrap(), 1.5);
        assert_eq!(store.increment("spent", 2.0).await.unwrap(), 3.5);
    }

    #[tokio::test]
    async fn test_increment_non_numeric() {
        let store = MemoryStore::new();
        store.put("k", json!("text")).await.unwrap();
        assert!(matches!(
            store.increment("k", 1.0).await,
            Err(StoreError::NotNumeric(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_atomic() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.increment("spent", 0.5).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get("spent").await.unwrap(), Some(json!(25.0)));
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryStore::new();
        assert!(!store.compare_and_swap("k", Some(&json!(1)), json!(2)).await.unwrap());
        assert!(store.compare_and_swap("k", None, json!(1)).await.unwrap());
        assert!(!store.compare_and_swap("k", None, json!(5)).await.unwrap());
        assert!(!store.compare_and_swap("k", Some(&json!(3)), json!(5)).await.unwrap());
        assert!(store.compare_and_swap("k", Some(&json!(1)), json!(2)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_compare_and_swap_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.compare_and_swap("lock", None, json!(i)).await.unwrap() })
            })
            .collect();
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_query_prefix_and_limit() {
        let store = MemoryStore::new();
        store.put("attempt:t1:2", json!(2)).await.unwrap();
        store.put("attempt:t1:1", json!(1)).await.unwrap();
        store.put("attempt:t2:1", json!(3)).await.unwrap();
        store.put("budget:month", json!(4)).await.unwrap();

        let rows = store.query(&StoreFilter::prefix("attempt:t1:")).await.unwrap();
        let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["attempt:t1:1", "attempt:t1:2"]);

        let rows = store
            .query(&StoreFilter::prefix("attempt:").limit(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
