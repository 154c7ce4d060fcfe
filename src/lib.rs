//! Region Limiter Library
//!
//! Load-aware admission control across independently quota'd regions.
//! A caller asks for one unit of work; the least loaded region with
//! capacity is charged, or the caller learns which region frees up next
//! and how long to wait.

pub mod config;
pub mod rate_limit;
pub mod simulate;

pub use rate_limit::{
    ConsumeResult, MemoryQuotaStore, QuotaStore, RegionError, RegionLimiterConfig, RegionSelector,
    StoreError,
};
