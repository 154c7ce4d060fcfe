//! Traffic Simulation
//!
//! Drives a [`RegionSelector`] with synthetic load and records how many
//! requests each region served per 10-second bucket.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::rate_limit::{ConsumeResult, RegionError, RegionSelector, RegionSpec};

/// How much traffic to generate
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    /// Successful requests to issue before stopping
    pub trials: u64,

    /// Loops between one-second pauses (0 disables pausing)
    pub requests_per_second: u64,

    /// Extra random wait added on rejection, as a fraction of `retry_after`
    pub jitter: f64,
}

impl SimulationPlan {
    /// Plan `coefficient` times the combined per-minute quota, for `minutes`
    pub fn from_regions(regions: &[RegionSpec], coefficient: f64, minutes: u64) -> Self {
        let total_quota: u64 = regions.iter().map(|r| r.quota as u64).sum();
        let trials_per_minute = (total_quota as f64 * coefficient).floor().max(0.0) as u64;

        Self {
            trials: trials_per_minute * minutes,
            requests_per_second: trials_per_minute / 60,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    fn backoff(&self, retry_after: Duration) -> Duration {
        let base = retry_after.max(Duration::from_millis(1));
        if self.jitter <= 0.0 {
            return base;
        }
        base.mul_f64(1.0 + rand::random::<f64>() * self.jitter)
    }
}

/// Successful requests per region, keyed by 10-second timestamp bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measurement(BTreeMap<String, BTreeMap<String, u64>>);

impl Measurement {
    /// Empty measurement with a series for every region
    pub fn new<'a>(regions: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            regions
                .into_iter()
                .map(|r| (r.to_string(), BTreeMap::new()))
                .collect(),
        )
    }

    pub fn record(&mut self, region: &str, bucket: String) {
        *self
            .0
            .entry(region.to_string())
            .or_default()
            .entry(bucket)
            .or_insert(0) += 1;
    }

    /// Total requests recorded for `region`
    pub fn total(&self, region: &str) -> u64 {
        self.0
            .get(region)
            .map(|series| series.values().sum())
            .unwrap_or(0)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Summary of a finished simulation
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub measurement: Measurement,
    pub requested: u64,
    pub rejected: u64,
    pub loops: u64,
    pub elapsed_ms: u64,
}

/// Current time truncated to a 10-second bucket, e.g. `2024-05-01 12:34:50`
pub fn bucket_timestamp() -> String {
    let now = chrono::Local::now();
    format!("{}{}0", now.format("%Y-%m-%d %H:%M:"), now.second() / 10)
}

/// Run `plan` against `selector`
///
/// Rejections are waited out for `retry_after` (plus jitter). Store errors
/// abort the run.
pub async fn run(selector: &RegionSelector, plan: &SimulationPlan) -> Result<SimulationReport, RegionError> {
    let started = Instant::now();
    let mut measurement = Measurement::new(selector.regions());
    let mut requested = 0u64;
    let mut rejected = 0u64;
    let mut loops = 0u64;

    info!(
        "Starting simulation: {} requests across {} regions",
        plan.trials,
        selector.len()
    );

    while requested < plan.trials {
        match selector.consume().await? {
            ConsumeResult::Requestable { region, .. } => {
                measurement.record(&region, bucket_timestamp());
                requested += 1;
                debug!(
                    "Call {} Region API ({} requests out of {})",
                    region, requested, plan.trials
                );
            }
            ConsumeResult::Rejected { retry_after_ms, .. } => {
                rejected += 1;
                debug!("Wait for next traffic ({}ms)", retry_after_ms);
                sleep(plan.backoff(Duration::from_millis(retry_after_ms))).await;
            }
        }

        loops += 1;
        if plan.requests_per_second > 0 && loops % plan.requests_per_second == 0 {
            sleep(Duration::from_secs(1)).await;
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        "Simulation finished: {} requests, {} rejections in {}ms",
        requested, rejected, elapsed_ms
    );

    Ok(SimulationReport {
        measurement,
        requested,
        rejected,
        loops,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{MemoryQuotaStore, RegionLimiterConfig};
    use std::sync::Arc;

    #[test]
    fn test_plan_from_regions() {
        let regions = vec![
            RegionSpec::new("us-west1", 100, 60),
            RegionSpec::new("us-west2", 100, 60),
            RegionSpec::new("us-west3", 50, 60),
        ];
        let plan = SimulationPlan::from_regions(&regions, 2.5, 3);
        assert_eq!(plan.trials, 625 * 3);
        assert_eq!(plan.requests_per_second, 10);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let plan = SimulationPlan {
            trials: 1,
            requests_per_second: 0,
            jitter: 0.0,
        }
        .with_jitter(0.5);

        for _ in 0..50 {
            let wait = plan.backoff(Duration::from_millis(1000));
            assert!(wait >= Duration::from_millis(1000));
            assert!(wait <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_measurement_json_shape() {
        let mut measurement = Measurement::new(["A", "B"]);
        measurement.record("A", "2024-05-01 12:34:50".to_string());
        measurement.record("A", "2024-05-01 12:34:50".to_string());

        assert_eq!(measurement.total("A"), 2);
        assert_eq!(measurement.total("B"), 0);
        assert_eq!(
            serde_json::to_value(&measurement).unwrap(),
            serde_json::json!({"A": {"2024-05-01 12:34:50": 2}, "B": {}})
        );
    }

    #[test]
    fn test_bucket_timestamp_format() {
        let bucket = bucket_timestamp();
        assert_eq!(bucket.len(), "2024-05-01 12:34:50".len());
        assert!(bucket.ends_with('0'));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_out_rejections() {
        let store = MemoryQuotaStore::new();
        let mut selector =
            RegionSelector::with_store(RegionLimiterConfig::new("sim"), Arc::new(store)).unwrap();
        selector.register("A", 2, 1).await.unwrap();
        selector.register("B", 1, 1).await.unwrap();

        let plan = SimulationPlan {
            trials: 9,
            requests_per_second: 0,
            jitter: 0.1,
        };
        let report = run(&selector, &plan).await.unwrap();

        assert_eq!(report.requested, 9);
        assert!(report.rejected > 0);
        assert_eq!(report.measurement.total("A") + report.measurement.total("B"), 9);
        assert!(report.elapsed_ms >= 2000);
    }
}
