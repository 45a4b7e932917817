//! Connection pooling for Rowkeep.
//!
//! A blocking pool of driver connections. [`Pool::acquire`] hands out a
//! [`PooledConnection`] guard; dropping the guard returns the connection to
//! the pool, whether the caller finished normally, returned early with an
//! error, or is unwinding from a panic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rowkeep_core::error::ConfigError;
use rowkeep_core::{Connection, Error, Result, StorageErrorKind};
use serde::{Deserialize, Serialize};

/// Opens new connections for a pool.
pub trait ConnectionManager: Send + Sync {
    type Connection: Connection;

    /// Open a fresh connection.
    fn connect(&self) -> Result<Self::Connection>;

    /// Check a pooled connection before handing it out again.
    fn is_valid(&self, conn: &Self::Connection) -> bool {
        conn.is_valid()
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Maximum time to wait for a connection in milliseconds
    pub acquire_timeout_ms: u64,
    /// Test idle connections before giving them out
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 30_000, // 30 seconds
            test_on_checkout: false,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Set acquire timeout.
    pub fn acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    /// Enable/disable test on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(ConfigError {
                message: "pool max_connections must be at least 1".to_string(),
            }));
        }
        Ok(())
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of connections currently checked out
    pub active_connections: usize,
    /// Number of callers blocked in `acquire`
    pub pending_requests: usize,
    /// Number of successful checkouts over the pool's lifetime
    pub acquire_count: u64,
}

struct PoolState<C> {
    idle: Vec<C>,
    total: usize,
    waiting: usize,
    closed: bool,
}

/// A blocking pool of connections produced by a [`ConnectionManager`].
pub struct Pool<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<PoolState<M::Connection>>,
    available: Condvar,
    acquire_count: AtomicU64,
}

impl<M: ConnectionManager> Pool<M> {
    /// Create a new pool. No connection is opened until the first `acquire`.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            manager,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.max_connections),
                total: 0,
                waiting: 0,
                closed: false,
            }),
            config,
            available: Condvar::new(),
            acquire_count: AtomicU64::new(0),
        })
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check out a connection, blocking until one is free or the acquire
    /// timeout elapses.
    pub fn acquire(&self) -> Result<PooledConnection<'_, M>> {
        let deadline = Instant::now() + Duration::from_millis(self.config.acquire_timeout_ms);
        let mut state = self.lock_state();

        loop {
            if state.closed {
                return Err(Error::storage(StorageErrorKind::Pool, "pool is closed"));
            }

            if let Some(conn) = state.idle.pop() {
                if !self.config.test_on_checkout {
                    return Ok(self.checkout(conn));
                }
                drop(state);
                if self.manager.is_valid(&conn) {
                    return Ok(self.checkout(conn));
                }
                tracing::debug!("Discarding pooled connection that failed its checkout test");
                drop(conn);
                state = self.lock_state();
                state.total -= 1;
                continue;
            }

            if state.total < self.config.max_connections {
                state.total += 1;
                let total = state.total;
                drop(state);
                tracing::debug!(total, "Opening new pooled connection");
                return match self.manager.connect() {
                    Ok(conn) => Ok(self.checkout(conn)),
                    Err(err) => {
                        self.lock_state().total -= 1;
                        self.available.notify_one();
                        Err(err)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(
                    max_connections = self.config.max_connections,
                    "Timed out waiting for a pooled connection"
                );
                return Err(Error::storage(
                    StorageErrorKind::Pool,
                    format!(
                        "timed out after {}ms waiting for a connection",
                        self.config.acquire_timeout_ms
                    ),
                ));
            }

            state.waiting += 1;
            let (next, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = next;
            state.waiting -= 1;
        }
    }

    fn checkout(&self, conn: M::Connection) -> PooledConnection<'_, M> {
        self.acquire_count.fetch_add(1, Ordering::Relaxed);
        PooledConnection {
            pool: self,
            conn: Some(conn),
        }
    }

    fn release(&self, conn: M::Connection) {
        let mut state = self.lock_state();
        if state.closed {
            state.total -= 1;
            drop(state);
            drop(conn);
        } else {
            state.idle.push(conn);
            drop(state);
        }
        self.available.notify_one();
    }

    fn forget(&self) {
        self.lock_state().total -= 1;
        self.available.notify_one();
    }

    /// Close the pool: idle connections are dropped now, checked-out ones
    /// when they come back. Later `acquire` calls fail.
    pub fn close(&self) {
        let idle = {
            let mut state = self.lock_state();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.total -= idle.len();
            idle
        };
        tracing::debug!(dropped = idle.len(), "Closing connection pool");
        drop(idle);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.total - state.idle.len(),
            pending_requests: state.waiting,
            acquire_count: self.acquire_count.load(Ordering::Relaxed),
        }
    }
}

impl<M: ConnectionManager> std::fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A connection checked out of a [`Pool`].
///
/// Returned to the pool when dropped.
pub struct PooledConnection<'a, M: ConnectionManager> {
    pool: &'a Pool<M>,
    conn: Option<M::Connection>,
}

impl<M: ConnectionManager> std::fmt::Debug for PooledConnection<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("attached", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl<M: ConnectionManager> PooledConnection<'_, M> {
    /// Take the connection out of the pool for good. The pool opens a
    /// replacement on a later `acquire`.
    pub fn detach(mut self) -> Option<M::Connection> {
        let conn = self.conn.take();
        self.pool.forget();
        conn
    }
}

impl<M: ConnectionManager> std::ops::Deref for PooledConnection<'_, M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        // `conn` is only emptied by `detach`, which consumes the guard.
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after detach"),
        }
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<'_, M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
