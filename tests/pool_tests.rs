//! Integration tests for the bounded connection pool
//!
//! # Test Coverage
//!
//! - `max_connections = 2`: two immediate grants, a third that waits for a release
//! - Timeout when nothing is released within the wait window
//! - RAII release on drop and through early returns
//! - Transaction commit, rollback, failed commit and drop-without-commit
//! - Concurrent borrowers never exceed the bound

use brrtserve::pool::{Pool, PoolConfig, PoolError};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

mod common;
use common::fixtures::{CountingManager, RefusedError};

fn pool(max: usize, timeout_ms: u64) -> Pool<CountingManager> {
    Pool::new(CountingManager::default(), PoolConfig::new(0, max, timeout_ms)).unwrap()
}

#[test]
fn test_two_immediate_third_waits_for_release() {
    let pool = pool(2, 2_000);
    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();
    assert_eq!(pool.status().checked_out, 2);
    let released_serial = second.serial;

    thread::scope(|s| {
        s.spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(second);
        });

        let started = Instant::now();
        let third = pool.acquire().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(third.serial, released_serial, "released connection is reused");
    });

    drop(first);
    assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 2);
    assert_eq!(pool.status().checked_out, 0);
    assert_eq!(pool.status().free, 2);
}

#[test]
fn test_exhausted_pool_times_out() {
    let pool = pool(2, 50);
    let _a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();

    let started = Instant::now();
    match pool.acquire() {
        Err(PoolError::Timeout {
            waited,
            max_connections,
        }) => {
            assert_eq!(max_connections, 2);
            assert!(waited >= Duration::from_millis(40));
        }
        Err(e) => panic!("expected timeout, got {e}"),
        Ok(_) => panic!("pool handed out a third connection"),
    }
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(pool.status().checked_out, 2);
}

#[test]
fn test_release_resets_connection() {
    let pool = pool(1, 50);
    {
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.serial, 0);
    }
    assert_eq!(pool.manager().resets.load(Ordering::SeqCst), 1);

    let conn = pool.acquire().unwrap();
    conn.release();
    assert_eq!(pool.manager().resets.load(Ordering::SeqCst), 2);
    assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 1);
}

fn failing_lookup(pool: &Pool<CountingManager>) -> Result<usize, PoolError<RefusedError>> {
    let conn = pool.acquire()?;
    if conn.serial == 0 {
        return Err(PoolError::Connect(RefusedError));
    }
    Ok(conn.serial)
}

#[test]
fn test_early_return_still_releases() {
    let pool = pool(1, 50);
    assert!(failing_lookup(&pool).is_err());
    assert_eq!(pool.status().checked_out, 0);
    assert!(pool.try_acquire().is_ok());
}

#[test]
fn test_connect_failure_surfaces() {
    let manager = CountingManager {
        refuse_connect: true,
        ..CountingManager::default()
    };
    let pool = Pool::new(manager, PoolConfig::new(0, 2, 50)).unwrap();
    assert!(matches!(pool.acquire(), Err(PoolError::Connect(_))));
    assert_eq!(pool.status().checked_out, 0);

    let manager = CountingManager {
        refuse_connect: true,
        ..CountingManager::default()
    };
    assert!(Pool::new(manager, PoolConfig::new(1, 2, 50)).is_err());
}

#[test]
fn test_transaction_commit_and_rollback() {
    let pool = pool(1, 50);

    let mut tx = pool.begin().unwrap();
    assert!(tx.connection().in_transaction);
    tx.commit().unwrap();
    assert_eq!(pool.manager().commits.load(Ordering::SeqCst), 1);
    assert_eq!(pool.status().checked_out, 0);

    let tx = pool.begin().unwrap();
    tx.rollback().unwrap();
    assert_eq!(pool.manager().rollbacks.load(Ordering::SeqCst), 1);

    {
        let _tx = pool.begin().unwrap();
    }
    assert_eq!(pool.manager().rollbacks.load(Ordering::SeqCst), 2);
    assert_eq!(pool.status().checked_out, 0);
    assert!(!pool.acquire().unwrap().in_transaction);
}

#[test]
fn test_failed_commit_rolls_back_and_releases() {
    let manager = CountingManager {
        refuse_commit: true,
        ..CountingManager::default()
    };
    let pool = Pool::new(manager, PoolConfig::new(0, 1, 50)).unwrap();
    let tx = pool.begin().unwrap();
    assert!(matches!(tx.commit(), Err(PoolError::Transaction(_))));
    assert_eq!(pool.manager().rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(pool.status().checked_out, 0);
}

#[test]
fn test_concurrent_borrowers_respect_bound() {
    let pool = pool(3, 2_000);
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..20 {
                    // a woken waiter can lose the freed slot to a newcomer; that is a timeout
                    match pool.acquire() {
                        Ok(conn) => {
                            assert!(pool.status().checked_out <= 3);
                            thread::sleep(Duration::from_millis(1));
                            drop(conn);
                        }
                        Err(PoolError::Timeout { .. }) => {}
                        Err(e) => panic!("unexpected pool error: {e}"),
                    }
                }
            });
        }
    });
    let status = pool.status();
    assert_eq!(status.checked_out, 0);
    assert!(status.free <= 3);
    assert!(pool.manager().connects.load(Ordering::SeqCst) <= 3);
}
