//! # Pool Module
//!
//! A generic, bounded pool of reusable lower-level connections (database sessions in
//! practice) shared by every request coroutine.
//!
//! ## Overview
//!
//! - [`Pool::acquire`] hands out a free connection, creates a new one while fewer than
//!   `max_connections` are checked out, and otherwise waits **once** for up to
//!   `timeout_ms` for a release before retrying a single time. A second exhaustion is
//!   [`PoolError::Timeout`].
//! - Releasing resets the connection to its default transaction state, returns it to
//!   the back of the free list and wakes one waiter. Reuse is therefore FIFO-ish.
//! - The free list and the checked-out counter live under one `may::sync::Mutex`, so
//!   `checked_out + free <= max_connections` holds at every observable point.
//!
//! ## Borrowing
//!
//! [`PooledConnection`] is an RAII guard: dropping it releases the connection, so data
//! access code releases exactly once on every path, including `?` early returns.
//! [`Transaction`] replaces ambient per-thread transaction state with an explicit
//! handle that is passed down the call chain.
//!
//! ```rust,ignore
//! let pool = Pool::new(manager, PoolConfig::default())?;
//! let mut tx = pool.begin()?;
//! insert_user(tx.connection(), &user)?;
//! tx.commit()?;
//! ```

mod core;
mod transaction;

pub use core::{ConnectionManager, Pool, PoolConfig, PoolError, PoolStatus, PooledConnection};
pub use transaction::Transaction;
