//! Region and Quota Types
//!
//! This module provides the region definition, the point-in-time quota
//! snapshot, the traffic sample derived from it, and the result handed
//! back to callers of `consume`.

use serde::{Serialize, Serializer};
use std::time::Duration;

use super::error::{RegionError, Result};

/// Longest accepted window, in seconds: its length in milliseconds must fit an `i64`
pub const MAX_WINDOW_SECS: u64 = i64::MAX as u64 / 1000;

/// An independently quota'd resource competing for traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Unique region name
    pub name: String,

    /// Maximum units per window
    pub quota: u32,

    /// Window length
    pub duration: Duration,
}

impl Region {
    /// Create a region, rejecting empty names, zero quota and out-of-range durations
    pub fn new(name: impl Into<String>, quota: u32, duration_secs: u64) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| RegionError::InvalidRegion {
            region: name.clone(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("region name must not be empty"));
        }
        if quota == 0 {
            return Err(invalid("quota must be greater than 0"));
        }
        if duration_secs == 0 {
            return Err(invalid("duration must be greater than 0"));
        }
        if duration_secs > MAX_WINDOW_SECS {
            return Err(invalid("duration is too large"));
        }

        Ok(Self {
            name,
            quota,
            duration: Duration::from_secs(duration_secs),
        })
    }

    /// Window length in whole seconds
    pub fn duration_secs(&self) -> u64 {
        self.duration.as_secs()
    }
}

/// Read-only view of a region's quota at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    /// Units left in the current window
    pub remaining: u32,

    /// Units per window
    pub capacity: u32,

    /// Milliseconds until the window resets
    pub ms_before_next: u64,
}

impl QuotaSnapshot {
    /// Snapshot of a region with no consumption in the current window
    pub fn full(capacity: u32) -> Self {
        Self {
            remaining: capacity,
            capacity,
            ms_before_next: 0,
        }
    }

    /// Fraction of the quota consumed, in `[0, 1]`
    pub fn traffic_rate(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        let remaining = self.remaining.min(self.capacity) as f64;
        (1.0 - remaining / self.capacity as f64).clamp(0.0, 1.0)
    }
}

/// Load of one region, computed fresh for every selection round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSample {
    pub region: String,
    pub traffic_rate: f64,
    pub ms_before_next: u64,
}

impl TrafficSample {
    pub fn from_snapshot(region: impl Into<String>, snapshot: &QuotaSnapshot) -> Self {
        Self {
            region: region.into(),
            traffic_rate: snapshot.traffic_rate(),
            ms_before_next: snapshot.ms_before_next,
        }
    }
}

/// Outcome of one admission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResult {
    /// A unit was taken from `region`
    Requestable {
        region: String,
        /// Units left in the region's window after this one
        remaining: u32,
    },

    /// The least loaded region had no capacity left
    Rejected {
        region: String,
        /// Milliseconds until `region` frees up
        retry_after_ms: u64,
    },
}

impl ConsumeResult {
    pub fn is_requestable(&self) -> bool {
        matches!(self, ConsumeResult::Requestable { .. })
    }

    /// Region the decision was made for
    pub fn region(&self) -> &str {
        match self {
            ConsumeResult::Requestable { region, .. } | ConsumeResult::Rejected { region, .. } => {
                region
            }
        }
    }

    /// Suggested wait before retrying, if rejected
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ConsumeResult::Requestable { .. } => None,
            ConsumeResult::Rejected { retry_after_ms, .. } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
        }
    }
}

// `{requestable, region, remaining}` or `{requestable, region, retryAfter}`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsumeResultWire<'a> {
    requestable: bool,
    region: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl Serialize for ConsumeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            ConsumeResult::Requestable { region, remaining } => ConsumeResultWire {
                requestable: true,
                region,
                remaining: Some(*remaining),
                retry_after: None,
            },
            ConsumeResult::Rejected {
                region,
                retry_after_ms,
            } => ConsumeResultWire {
                requestable: false,
                region,
                remaining: None,
                retry_after: Some(*retry_after_ms),
            },
        };
        wire.serialize(serializer)
    }
}
