//! Redis Quota Store
//!
//! Fixed-window counters kept in Redis so that every process sharing the
//! same server coordinates on one set of quotas. Consumption runs as a
//! single Lua script, which Redis executes atomically.
//!
//! A connection error drops the cached connection, so the next request
//! reconnects instead of reusing a dead socket.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, Script};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::error::StoreError;
use super::store::{
    AtomicConnectionState, ConnectionState, QuotaStore, StoreConsumption, StoreRecord,
};

/// Opens the window on first use, adds the points and reports the window's TTL.
const CONSUME_SCRIPT: &str = r"
redis.call('set', KEYS[1], 0, 'PX', ARGV[2], 'NX')
local consumed = redis.call('incrby', KEYS[1], ARGV[1])
local ttl = redis.call('pttl', KEYS[1])
if ttl == -1 then
  redis.call('pexpire', KEYS[1], ARGV[2])
  ttl = tonumber(ARGV[2])
end
return {consumed, ttl}
";

/// Redis-backed quota store with lazy, single-flight (re)connection
#[derive(Clone)]
pub struct RedisQuotaStore {
    client: Client,

    /// Connection URL (for diagnostics)
    endpoint: String,

    /// Shared multiplexed connection, opened on first use and after a drop
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,

    state: Arc<AtomicConnectionState>,

    script: Arc<Script>,
}

impl std::fmt::Debug for RedisQuotaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQuotaStore")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.load())
            .finish()
    }
}

impl RedisQuotaStore {
    /// Create a store for `url` without connecting
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Connection {
            endpoint: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            endpoint: url.to_string(),
            connection: Arc::new(Mutex::new(None)),
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            script: Arc::new(Script::new(CONSUME_SCRIPT)),
        })
    }

    /// Create a store for `host:port`
    pub fn from_host(host: &str, port: u16) -> Result<Self, StoreError> {
        Self::new(&format!("redis://{}:{}/", host, port))
    }

    /// Connection URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        // Held across the connect so concurrent callers share one attempt
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        self.state.store(ConnectionState::Connecting);
        tracing::info!("Connecting to quota store at {}", self.endpoint);

        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                *slot = Some(conn.clone());
                self.state.store(ConnectionState::Connected);
                tracing::info!("Connected to quota store at {}", self.endpoint);
                Ok(conn)
            }
            Err(err) => {
                self.state.store(ConnectionState::Disconnected);
                tracing::error!("Quota store connection failed: {}", err);
                Err(StoreError::Connection {
                    endpoint: self.endpoint.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    fn map_error(&self, err: RedisError) -> StoreError {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StoreError::Connection {
                endpoint: self.endpoint.clone(),
                reason: err.to_string(),
            }
        } else {
            StoreError::Backend(err.to_string())
        }
    }

    /// Map a request error, forgetting the connection if it is no longer usable
    async fn request_failed(&self, err: RedisError) -> StoreError {
        let err = self.map_error(err);
        if err.is_connection() {
            self.connection.lock().await.take();
            self.state.store(ConnectionState::Disconnected);
            tracing::warn!("Lost connection to quota store: {}", err);
        }
        err
    }
}

fn window_millis(duration: Duration) -> Result<u64, StoreError> {
    u64::try_from(duration.as_millis())
        .ok()
        .filter(|ms| *ms <= i64::MAX as u64)
        .map(|ms| ms.max(1))
        .ok_or_else(|| StoreError::Backend(format!("window of {:?} is out of range", duration)))
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn connect(&self) -> Result<(), StoreError> {
        self.connection().await.map(|_| ())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.load()
    }

    async fn get(&self, key: &str) -> Result<Option<StoreRecord>, StoreError> {
        let mut conn = self.connection().await?;

        let reply: Result<(Option<i64>, i64), RedisError> = redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await;
        let (consumed, ttl) = match reply {
            Ok(reply) => reply,
            Err(err) => return Err(self.request_failed(err).await),
        };

        // A missing key or one that expired between GET and PTTL has no window
        match consumed {
            Some(consumed) if ttl != -2 => Ok(Some(StoreRecord {
                consumed_points: consumed.max(0) as u64,
                ms_before_next: ttl.max(0) as u64,
            })),
            _ => Ok(None),
        }
    }

    async fn consume(
        &self,
        key: &str,
        points: u32,
        capacity: u32,
        duration: Duration,
    ) -> Result<StoreConsumption, StoreError> {
        let window_ms = window_millis(duration)?;
        let mut conn = self.connection().await?;

        let reply: Result<(i64, i64), RedisError> = self
            .script
            .key(key)
            .arg(points)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await;
        let (consumed, ttl) = match reply {
            Ok(reply) => reply,
            Err(err) => return Err(self.request_failed(err).await),
        };

        if consumed < 0 {
            return Err(StoreError::InvalidResponse(format!(
                "negative counter {} for key {}",
                consumed, key
            )));
        }

        let ms_before_next = ttl.max(0) as u64;
        if consumed as u64 > capacity as u64 {
            Ok(StoreConsumption::Exceeded { ms_before_next })
        } else {
            Ok(StoreConsumption::Granted {
                remaining_points: capacity - consumed as u32,
                ms_before_next,
            })
        }
    }
}
