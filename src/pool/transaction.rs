use super::core::{ConnectionManager, Pool, PoolError, PooledConnection};
use tracing::{error, info, warn};

/// Explicit transaction handle over a borrowed connection.
///
/// Passed by `&mut` down to the data-access code that needs it. Finishing it with
/// [`commit`](Transaction::commit) or [`rollback`](Transaction::rollback) consumes
/// the handle; dropping an unfinished transaction rolls it back. In every case the
/// connection goes back to the pool, where `reset` restores auto-commit.
pub struct Transaction<'a, M: ConnectionManager> {
    conn: PooledConnection<'a, M>,
    finished: bool,
}

impl<M: ConnectionManager> Pool<M> {
    /// Acquire a connection and open a transaction on it.
    ///
    /// # Errors
    ///
    /// Any [`Pool::acquire`] error, or [`PoolError::Transaction`] if `begin` fails
    /// (the connection is released in that case).
    pub fn begin(&self) -> Result<Transaction<'_, M>, PoolError<M::Error>> {
        let mut conn = self.acquire()?;
        self.manager()
            .begin(&mut conn)
            .map_err(PoolError::Transaction)?;
        Ok(Transaction {
            conn,
            finished: false,
        })
    }
}

impl<M: ConnectionManager> Transaction<'_, M> {
    pub fn connection(&mut self) -> &mut M::Connection {
        &mut self.conn
    }

    /// Commit; on failure roll back before reporting the commit error.
    ///
    /// # Errors
    ///
    /// [`PoolError::Transaction`] carrying the commit failure.
    pub fn commit(mut self) -> Result<(), PoolError<M::Error>> {
        self.finished = true;
        let manager = self.conn.pool().manager();
        match manager.commit(&mut self.conn) {
            Ok(()) => {
                info!("Transaction committed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Commit failed - rolling back");
                if let Err(rollback_err) = manager.rollback(&mut self.conn) {
                    error!(error = %rollback_err, "Rollback after failed commit also failed");
                }
                Err(PoolError::Transaction(e))
            }
        }
    }

    /// # Errors
    ///
    /// [`PoolError::Transaction`] carrying the rollback failure.
    pub fn rollback(mut self) -> Result<(), PoolError<M::Error>> {
        self.finished = true;
        let manager = self.conn.pool().manager();
        manager
            .rollback(&mut self.conn)
            .map_err(PoolError::Transaction)
    }
}

impl<M: ConnectionManager> Drop for Transaction<'_, M> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("Transaction dropped without commit - rolling back");
        let manager = self.conn.pool().manager();
        if let Err(e) = manager.rollback(&mut self.conn) {
            error!(error = %e, "Rollback of abandoned transaction failed");
        }
    }
}
