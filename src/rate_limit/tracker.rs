//! Quota Tracker
//!
//! Binds one region to its namespaced key in the shared store.

use std::sync::Arc;

use super::error::{QuotaError, StoreError};
use super::quota::{QuotaSnapshot, Region};
use super::store::{QuotaStore, StoreConsumption};

/// Handle on a single region's counter
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    region: Region,

    /// Store key, `<appname>:rl:<region>`
    key: String,

    store: Arc<dyn QuotaStore>,
}

impl QuotaTracker {
    pub fn new(region: Region, key: String, store: Arc<dyn QuotaStore>) -> Self {
        Self { region, key, store }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the current window without consuming
    ///
    /// A key with no live window yields a full-capacity snapshot.
    pub async fn peek(&self) -> Result<QuotaSnapshot, StoreError> {
        let capacity = self.region.quota;
        let snapshot = match self.store.get(&self.key).await? {
            Some(record) => QuotaSnapshot {
                remaining: record.remaining_points(capacity),
                capacity,
                ms_before_next: record.ms_before_next,
            },
            None => QuotaSnapshot::full(capacity),
        };
        Ok(snapshot)
    }

    /// Take one unit, returning the units left in the window
    pub async fn consume(&self) -> Result<u32, QuotaError> {
        let outcome = self
            .store
            .consume(&self.key, 1, self.region.quota, self.region.duration)
            .await?;

        match outcome {
            StoreConsumption::Granted {
                remaining_points, ..
            } => Ok(remaining_points.min(self.region.quota)),
            StoreConsumption::Exceeded { ms_before_next } => {
                Err(QuotaError::Exceeded { ms_before_next })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::store::MemoryQuotaStore;

    fn tracker(store: &MemoryQuotaStore, quota: u32) -> QuotaTracker {
        let region = Region::new("us-west1", quota, 60).unwrap();
        QuotaTracker::new(region, "myapp:rl:us-west1".to_string(), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_peek_untouched_region() {
        let store = MemoryQuotaStore::new();
        let tracker = tracker(&store, 5);

        assert_eq!(tracker.peek().await.unwrap(), QuotaSnapshot::full(5));
        assert_eq!(tracker.key(), "myapp:rl:us-west1");
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let store = MemoryQuotaStore::new();
        let tracker = tracker(&store, 2);

        assert_eq!(tracker.consume().await.unwrap(), 1);
        for _ in 0..3 {
            let snapshot = tracker.peek().await.unwrap();
            assert_eq!(snapshot.remaining, 1);
            assert!(snapshot.ms_before_next > 0);
        }
    }

    #[tokio::test]
    async fn test_consume_exceeded() {
        let store = MemoryQuotaStore::new();
        let tracker = tracker(&store, 1);

        assert_eq!(tracker.consume().await.unwrap(), 0);
        match tracker.consume().await {
            Err(QuotaError::Exceeded { ms_before_next }) => {
                assert!(ms_before_next > 0 && ms_before_next <= 60_000)
            }
            other => panic!("expected quota exceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_not_quota_exceeded() {
        let store = MemoryQuotaStore::new();
        let tracker = tracker(&store, 1);
        store
            .set_failure(Some(StoreError::Backend("LOADING".to_string())))
            .await;

        assert!(matches!(tracker.consume().await, Err(QuotaError::Store(_))));
        assert!(tracker.peek().await.is_err());
    }
}
