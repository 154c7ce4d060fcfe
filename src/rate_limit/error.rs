//! Region Limiter Error Types
//!
//! This module defines the error taxonomy for region selection and the
//! quota store layer. Quota exhaustion and store failures are separate
//! variants so callers never mistake a backend outage for a full region.

/// Failure talking to the shared quota store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("Store connection error ({endpoint}): {reason}")]
    Connection {
        /// Endpoint that was dialed
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// The store answered with a failure
    #[error("Store error: {0}")]
    Backend(String),

    /// The store answered with something we cannot interpret
    #[error("Invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Whether the error was raised while establishing the connection
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection { .. })
    }
}

/// Failure consuming a unit from a single region's quota
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    /// The current window is used up
    #[error("Quota exceeded, next unit in {ms_before_next}ms")]
    Exceeded {
        /// Milliseconds until the window resets
        ms_before_next: u64,
    },

    /// The store failed independently of quota state
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the region selector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// Missing or invalid initialization options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Region parameters out of range
    #[error("Invalid region '{region}': {reason}")]
    InvalidRegion {
        /// Region name as given
        region: String,
        /// Which constraint was violated
        reason: String,
    },

    /// Region name already registered
    #[error("Rate limiter for that region has already been created (region={0})")]
    DuplicateRegion(String),

    /// `consume` called before any region was registered
    #[error("No regions registered")]
    NoRegionsRegistered,

    /// Store failure, propagated unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegionError {
    /// Whether this error came from the store layer
    pub fn is_store_error(&self) -> bool {
        matches!(self, RegionError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, RegionError>;
