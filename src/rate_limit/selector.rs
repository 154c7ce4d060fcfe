//! Region Selector
//!
//! Picks the least loaded region and consumes one unit from it.
//!
//! Load is read from the shared store rather than from in-process counters,
//! so independent processes converge on the same view. Peek-then-consume is
//! racy by nature: another caller may drain the chosen region in between,
//! which is why the consume step can still come back rejected.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::{RegionLimiterConfig, RegionSpec};
use super::error::{QuotaError, RegionError, Result};
use super::quota::{ConsumeResult, Region, TrafficSample};
use super::store::{ConnectionState, QuotaStore};
use super::tiebreak::{RandomTieBreaker, TieBreaker};
use super::tracker::QuotaTracker;

/// Load-aware admission control over a fixed set of regions
///
/// Regions are registered up front through `&mut self`; once the selector is
/// shared (e.g. behind an `Arc`) the registry is read-only and `consume`
/// takes no locks of its own.
#[derive(Debug, Clone)]
pub struct RegionSelector {
    config: RegionLimiterConfig,

    store: Arc<dyn QuotaStore>,

    /// Trackers in registration order
    trackers: Vec<QuotaTracker>,

    tie_breaker: Arc<dyn TieBreaker>,
}

impl RegionSelector {
    /// Create a selector backed by the Redis store named in `config`
    ///
    /// The connection is opened on the first registration.
    #[cfg(feature = "redis-store")]
    pub fn new(config: RegionLimiterConfig) -> Result<Self> {
        config.validate()?;
        let store = super::redis_store::RedisQuotaStore::new(&config.store_url())?;
        Self::with_store(config, Arc::new(store))
    }

    /// Create a selector over an arbitrary store backend
    pub fn with_store(config: RegionLimiterConfig, store: Arc<dyn QuotaStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            trackers: Vec::new(),
            tie_breaker: Arc::new(RandomTieBreaker::new()),
        })
    }

    /// Replace the tie-break policy
    pub fn with_tie_breaker(mut self, tie_breaker: impl TieBreaker + 'static) -> Self {
        self.tie_breaker = Arc::new(tie_breaker);
        self
    }

    pub fn config(&self) -> &RegionLimiterConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.store.connection_state()
    }

    /// Register a region with `quota` units per `duration_secs` window
    ///
    /// # Errors
    ///
    /// * `DuplicateRegion` if the name is taken; existing state is untouched
    /// * `InvalidRegion` for an empty name or zero quota/duration
    /// * `Store` if the store cannot be reached
    pub async fn register(&mut self, region: &str, quota: u32, duration_secs: u64) -> Result<()> {
        if self.trackers.iter().any(|t| t.region().name == region) {
            return Err(RegionError::DuplicateRegion(region.to_string()));
        }
        let region = Region::new(region, quota, duration_secs)?;

        self.store.connect().await?;

        let key = self.config.key_for(&region.name);
        info!(
            "Registered region {} (quota={}, duration={}s, key={})",
            region.name,
            region.quota,
            region.duration_secs(),
            key
        );
        self.trackers
            .push(QuotaTracker::new(region, key, Arc::clone(&self.store)));
        Ok(())
    }

    /// Register every region in `specs`, stopping at the first failure
    pub async fn register_all(&mut self, specs: &[RegionSpec]) -> Result<()> {
        for spec in specs {
            self.register(&spec.region, spec.quota, spec.duration_secs)
                .await?;
        }
        Ok(())
    }

    /// Registered region names in registration order
    pub fn regions(&self) -> Vec<&str> {
        self.trackers
            .iter()
            .map(|t| t.region().name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Current load of every region, in registration order
    ///
    /// All regions are peeked concurrently; any store failure fails the call.
    pub async fn traffic(&self) -> Result<Vec<TrafficSample>> {
        let snapshots = try_join_all(self.trackers.iter().map(|t| t.peek())).await?;

        Ok(self
            .trackers
            .iter()
            .zip(snapshots.iter())
            .map(|(tracker, snapshot)| TrafficSample::from_snapshot(&tracker.region().name, snapshot))
            .collect())
    }

    /// Consume one unit from the least loaded region
    ///
    /// Returns `Rejected` with the wait time when the chosen region is
    /// exhausted. Store failures are returned as errors; there is no retry
    /// and no fallback to another region.
    pub async fn consume(&self) -> Result<ConsumeResult> {
        if self.trackers.is_empty() {
            return Err(RegionError::NoRegionsRegistered);
        }

        let samples = self.traffic().await?;
        let index = select_least_loaded(&samples, self.tie_breaker.as_ref())
            .ok_or(RegionError::NoRegionsRegistered)?;
        let tracker = &self.trackers[index];
        let region = tracker.region().name.clone();

        debug!(
            region = %region,
            traffic_rate = samples[index].traffic_rate,
            ms_before_next = samples[index].ms_before_next,
            "Selected least loaded region"
        );

        match tracker.consume().await {
            Ok(remaining) => Ok(ConsumeResult::Requestable { region, remaining }),
            Err(QuotaError::Exceeded { ms_before_next }) => {
                warn!("Region {} exhausted, retry after {}ms", region, ms_before_next);
                Ok(ConsumeResult::Rejected {
                    region,
                    retry_after_ms: ms_before_next,
                })
            }
            Err(QuotaError::Store(err)) => Err(err.into()),
        }
    }
}

/// Index of the region to use out of `samples`
///
/// Keeps the samples with the lowest traffic rate, narrows those to the
/// soonest `ms_before_next`, then lets `tie_breaker` choose among what is
/// left. Returns `None` only for an empty slice.
pub fn select_least_loaded(samples: &[TrafficSample], tie_breaker: &dyn TieBreaker) -> Option<usize> {
    let min_rate = samples
        .iter()
        .map(|s| s.traffic_rate)
        .reduce(f64::min)?;
    let least_loaded: Vec<usize> = (0..samples.len())
        .filter(|&i| samples[i].traffic_rate == min_rate)
        .collect();

    let min_wait = least_loaded
        .iter()
        .map(|&i| samples[i].ms_before_next)
        .min()?;
    let candidates: Vec<usize> = least_loaded
        .into_iter()
        .filter(|&i| samples[i].ms_before_next == min_wait)
        .collect();

    let pick = tie_breaker.pick(candidates.len()).min(candidates.len() - 1);
    Some(candidates[pick])
}
