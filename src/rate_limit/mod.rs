//! Region Rate Limiting Module
//!
//! This module provides load-aware admission control across several
//! independently quota'd regions sharing one quota store.
//!
//! # Features
//!
//! - Least-loaded region selection from shared, cross-process state
//! - Tie-break on soonest window reset, then uniform random choice
//! - Atomic per-region consumption delegated to the store backend
//! - Typed distinction between quota exhaustion and store failures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Region Selector                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Tracker     │  │ Tracker     │  │ Tracker     │         │
//! │  │ us-west1    │  │ us-west2    │  │ us-west3    │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        Quota Store (Redis or In-Memory)              │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut selector = RegionSelector::new(RegionLimiterConfig::new("myapp"))?;
//! selector.register("us-west1", 100, 60).await?;
//! selector.register("us-west2", 50, 60).await?;
//!
//! match selector.consume().await? {
//!     ConsumeResult::Requestable { region, .. } => call_region(&region).await,
//!     ConsumeResult::Rejected { retry_after_ms, .. } => wait(retry_after_ms).await,
//! }
//! ```

pub mod config;
pub mod error;
pub mod quota;
#[cfg(feature = "redis-store")]
pub mod redis_store;
pub mod selector;
pub mod store;
pub mod tiebreak;
pub mod tracker;

#[cfg(test)]
mod proptests;

pub use config::{RegionLimiterConfig, RegionSpec, StoreClientConfig};
pub use error::{QuotaError, RegionError, StoreError};
pub use quota::{ConsumeResult, QuotaSnapshot, Region, TrafficSample, MAX_WINDOW_SECS};
#[cfg(feature = "redis-store")]
pub use redis_store::RedisQuotaStore;
pub use selector::{select_least_loaded, RegionSelector};
pub use store::{ConnectionState, MemoryQuotaStore, QuotaStore};
pub use tiebreak::{FirstTieBreaker, RandomTieBreaker, TieBreaker};
pub use tracker::QuotaTracker;
