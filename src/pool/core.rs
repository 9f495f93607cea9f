use may::sync::{Condvar, Mutex, MutexGuard};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::PoisonError;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Opens and recycles the pooled connections.
///
/// Implemented by whatever owns the real driver. The transaction hooks default to
/// no-ops for connections without transactional state.
pub trait ConnectionManager: Send + Sync {
    type Connection: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a brand-new connection.
    fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Restore the clean default transaction state (auto-commit) before reuse.
    fn reset(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    fn begin(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn commit(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn rollback(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Sizing and wait policy for a [`Pool`]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened eagerly by [`Pool::new`]
    pub min_connections: usize,
    /// Upper bound on checked-out plus free connections
    pub max_connections: usize,
    /// How long the first exhausted attempt waits for a release
    pub timeout_ms: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn new(min_connections: usize, max_connections: usize, timeout_ms: u64) -> Self {
        Self {
            min_connections,
            max_connections,
            timeout_ms,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: 10,
            timeout_ms: 5_000,
        }
    }
}

/// Errors surfaced to the borrower
#[derive(Debug)]
pub enum PoolError<E> {
    /// Pool still exhausted after the single bounded wait
    Timeout {
        waited: Duration,
        max_connections: usize,
    },
    /// The manager failed to open a connection
    Connect(E),
    /// A transaction hook (begin/commit/rollback) failed
    Transaction(E),
}

impl<E: fmt::Display> fmt::Display for PoolError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Timeout {
                waited,
                max_connections,
            } => write!(
                f,
                "connection pool exhausted: all {max_connections} connections checked out after waiting {}ms",
                waited.as_millis()
            ),
            PoolError::Connect(e) => write!(f, "failed to open pooled connection: {e}"),
            PoolError::Transaction(e) => write!(f, "transaction failed: {e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PoolError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Timeout { .. } => None,
            PoolError::Connect(e) | PoolError::Transaction(e) => Some(e),
        }
    }
}

/// Point-in-time view of the pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub free: usize,
    pub checked_out: usize,
    pub max_connections: usize,
}

struct PoolState<C> {
    free: VecDeque<C>,
    checked_out: usize,
}

enum Grant<C> {
    Reuse(C),
    Create,
}

/// Bounded connection pool with one timeout-bounded retry.
pub struct Pool<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<PoolState<M::Connection>>,
    released: Condvar,
}

impl<M: ConnectionManager> Pool<M> {
    /// Build the pool and open `min_connections` (capped at `max_connections`) eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Connect`] if any of the initial connections fails to open.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, PoolError<M::Error>> {
        let prefill = config.min_connections.min(config.max_connections);
        let mut free = VecDeque::with_capacity(config.max_connections);
        for _ in 0..prefill {
            free.push_back(manager.connect().map_err(PoolError::Connect)?);
        }

        info!(
            min_connections = config.min_connections,
            max_connections = config.max_connections,
            timeout_ms = config.timeout_ms,
            prefilled = prefill,
            "Connection pool initialised"
        );

        Ok(Self {
            manager,
            config,
            state: Mutex::new(PoolState {
                free,
                checked_out: 0,
            }),
            released: Condvar::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn manager(&self) -> &M {
        &self.manager
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.lock_state();
        PoolStatus {
            free: state.free.len(),
            checked_out: state.checked_out,
            max_connections: self.config.max_connections,
        }
    }

    /// Borrow a connection, waiting once for a release if the pool is exhausted.
    ///
    /// The retry after the wait happens under the same lock acquisition that the
    /// wait returned, so a release that woke us cannot be stolen in between.
    ///
    /// # Errors
    ///
    /// [`PoolError::Timeout`] when the retry also finds the pool exhausted,
    /// [`PoolError::Connect`] when opening a fresh connection fails.
    pub fn acquire(&self) -> Result<PooledConnection<'_, M>, PoolError<M::Error>> {
        let started = Instant::now();
        let mut state = self.lock_state();

        let grant = match Self::try_grant(&mut state, self.config.max_connections) {
            Some(grant) => grant,
            None => {
                debug!(
                    checked_out = state.checked_out,
                    max_connections = self.config.max_connections,
                    timeout_ms = self.config.timeout_ms,
                    "Pool exhausted - waiting for a release"
                );
                let (guard, _) = self
                    .released
                    .wait_timeout(state, self.config.timeout())
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
                match Self::try_grant(&mut state, self.config.max_connections) {
                    Some(grant) => grant,
                    None => return Err(self.timed_out(started)),
                }
            }
        };
        drop(state);
        self.fulfil(grant)
    }

    /// Borrow a connection without waiting.
    ///
    /// # Errors
    ///
    /// [`PoolError::Timeout`] (with a zero wait) when the pool is exhausted.
    pub fn try_acquire(&self) -> Result<PooledConnection<'_, M>, PoolError<M::Error>> {
        let started = Instant::now();
        let mut state = self.lock_state();
        match Self::try_grant(&mut state, self.config.max_connections) {
            Some(grant) => {
                drop(state);
                self.fulfil(grant)
            }
            None => Err(self.timed_out(started)),
        }
    }

    /// Return a connection to the free list and wake one waiter.
    pub fn release(&self, mut conn: M::Connection) {
        if let Err(e) = self.manager.reset(&mut conn) {
            error!(error = %e, "Failed to reset pooled connection");
        }
        let mut state = self.lock_state();
        state.free.push_back(conn);
        debug_assert!(state.checked_out > 0, "release without matching acquire");
        state.checked_out = state.checked_out.saturating_sub(1);
        debug!(
            free = state.free.len(),
            checked_out = state.checked_out,
            "Connection released"
        );
        drop(state);
        self.released.notify_one();
    }

    fn try_grant(
        state: &mut PoolState<M::Connection>,
        max_connections: usize,
    ) -> Option<Grant<M::Connection>> {
        if let Some(conn) = state.free.pop_front() {
            state.checked_out += 1;
            Some(Grant::Reuse(conn))
        } else if state.checked_out < max_connections {
            state.checked_out += 1;
            Some(Grant::Create)
        } else {
            None
        }
    }

    fn fulfil(&self, grant: Grant<M::Connection>) -> Result<PooledConnection<'_, M>, PoolError<M::Error>> {
        let conn = match grant {
            Grant::Reuse(conn) => conn,
            // The slot was reserved under the lock; connect outside it.
            Grant::Create => match self.manager.connect() {
                Ok(conn) => {
                    debug!("Opened new pooled connection");
                    conn
                }
                Err(e) => {
                    let mut state = self.lock_state();
                    state.checked_out = state.checked_out.saturating_sub(1);
                    drop(state);
                    self.released.notify_one();
                    error!(error = %e, "Failed to open pooled connection");
                    return Err(PoolError::Connect(e));
                }
            },
        };
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    fn timed_out(&self, started: Instant) -> PoolError<M::Error> {
        let waited = started.elapsed();
        warn!(
            max_connections = self.config.max_connections,
            waited_ms = waited.as_millis() as u64,
            "Connection pool timeout"
        );
        PoolError::Timeout {
            waited,
            max_connections: self.config.max_connections,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A borrowed connection; released back to its pool on drop.
pub struct PooledConnection<'a, M: ConnectionManager> {
    pool: &'a Pool<M>,
    conn: Option<M::Connection>,
}

impl<'a, M: ConnectionManager> PooledConnection<'a, M> {
    #[must_use]
    pub fn pool(&self) -> &'a Pool<M> {
        self.pool
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<'_, M> {
    type Target = M::Connection;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<'_, M> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<'_, M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
