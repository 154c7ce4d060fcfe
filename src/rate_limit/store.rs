//! Quota Store
//!
//! Backend interface for the shared per-key window counters, plus an
//! in-memory implementation for single-process use and tests.
//!
//! Backends own atomicity: `consume` must check and deduct in one step so
//! that concurrent callers never spend more than `capacity` per window.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::error::StoreError;

/// State of a store's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempted yet, or the last attempt failed
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Ready for requests
    Connected,
}

/// Lock-free holder for a [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(Self::encode(state)))
    }

    pub fn load(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn store(&self, state: ConnectionState) {
        self.0.store(Self::encode(state), Ordering::SeqCst);
    }

    fn encode(state: ConnectionState) -> u8 {
        match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

/// Counter state of a key inside its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRecord {
    /// Points consumed in the current window
    pub consumed_points: u64,

    /// Milliseconds until the window expires
    pub ms_before_next: u64,
}

impl StoreRecord {
    /// Points left out of `capacity`
    pub fn remaining_points(&self, capacity: u32) -> u32 {
        (capacity as u64).saturating_sub(self.consumed_points) as u32
    }
}

/// Result of an atomic consume against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreConsumption {
    /// Points were deducted
    Granted {
        remaining_points: u32,
        ms_before_next: u64,
    },

    /// The window has no room for the requested points
    Exceeded { ms_before_next: u64 },
}

/// Keyed, atomic window counter service
#[async_trait]
pub trait QuotaStore: Send + Sync + std::fmt::Debug {
    /// Establish the connection if not already connected
    ///
    /// Concurrent first callers must share a single connection attempt.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Read the counter for `key` without modifying it
    ///
    /// Returns `Ok(None)` when the key has no live window.
    async fn get(&self, key: &str) -> Result<Option<StoreRecord>, StoreError>;

    /// Atomically take `points` from `key`, opening a `duration` window on first use
    async fn consume(
        &self,
        key: &str,
        points: u32,
        capacity: u32,
        duration: Duration,
    ) -> Result<StoreConsumption, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    consumed: u64,
    expires_at: Instant,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn ms_before_next(&self, now: Instant) -> u64 {
        ceil_millis(self.expires_at.saturating_duration_since(now))
    }
}

// Rounds up so that waiting the reported time always reaches expiry.
fn ceil_millis(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    nanos.div_ceil(1_000_000) as u64
}

/// In-memory fixed-window quota store
///
/// Windows are timed with `tokio::time::Instant`, so tests running on a
/// paused clock can advance through window expiry.
#[derive(Debug, Clone)]
pub struct MemoryQuotaStore {
    /// Live windows by key
    windows: Arc<RwLock<HashMap<String, Window>>>,

    /// Injected failure returned by every operation while set
    failure: Arc<RwLock<Option<StoreError>>>,

    state: Arc<AtomicConnectionState>,

    connects: Arc<AtomicUsize>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            failure: Arc::new(RwLock::new(None)),
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every subsequent operation fail with `error` (or recover with `None`)
    pub async fn set_failure(&self, error: Option<StoreError>) {
        *self.failure.write().await = error;
    }

    /// Number of times a connection was actually opened
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of keys with a live window
    pub async fn live_keys(&self) -> usize {
        let now = Instant::now();
        let windows = self.windows.read().await;
        windows.values().filter(|w| !w.is_expired(now)).count()
    }

    /// Drop every window
    pub async fn clear(&self) {
        self.windows.write().await.clear();
    }

    async fn check_failure(&self) -> Result<(), StoreError> {
        match self.failure.read().await.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl Default for MemoryQuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn connect(&self) -> Result<(), StoreError> {
        if self.state.load() == ConnectionState::Connected {
            return Ok(());
        }
        if let Err(err) = self.check_failure().await {
            self.state.store(ConnectionState::Disconnected);
            return Err(err);
        }

        // Hold the write lock while flipping state so only one caller counts as the opener
        let _guard = self.windows.write().await;
        if self.state.load() != ConnectionState::Connected {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.state.store(ConnectionState::Connected);
            tracing::debug!("In-memory quota store ready");
        }
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.load()
    }

    async fn get(&self, key: &str) -> Result<Option<StoreRecord>, StoreError> {
        self.check_failure().await?;

        let now = Instant::now();
        let windows = self.windows.read().await;
        Ok(windows
            .get(key)
            .filter(|w| !w.is_expired(now))
            .map(|w| StoreRecord {
                consumed_points: w.consumed,
                ms_before_next: w.ms_before_next(now),
            }))
    }

    async fn consume(
        &self,
        key: &str,
        points: u32,
        capacity: u32,
        duration: Duration,
    ) -> Result<StoreConsumption, StoreError> {
        self.check_failure().await?;

        let now = Instant::now();
        let expires_at = now.checked_add(duration).ok_or_else(|| {
            StoreError::Backend(format!("window of {:?} for key {} is out of range", duration, key))
        })?;

        let mut windows = self.windows.write().await;
        let window = windows
            .entry(key.to_string())
            .and_modify(|w| {
                if w.is_expired(now) {
                    *w = Window {
                        consumed: 0,
                        expires_at,
                    };
                }
            })
            .or_insert(Window {
                consumed: 0,
                expires_at,
            });

        let ms_before_next = window.ms_before_next(now);
        if window.consumed + points as u64 > capacity as u64 {
            return Ok(StoreConsumption::Exceeded { ms_before_next });
        }

        window.consumed += points as u64;
        Ok(StoreConsumption::Granted {
            remaining_points: (capacity as u64 - window.consumed) as u32,
            ms_before_next,
        })
    }
}
