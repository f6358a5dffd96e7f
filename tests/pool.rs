//! Pool lifecycle and capacity accounting under concurrency.

mod common;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use diampool::{Error, Pool};

use crate::common::{options, DuplexConnector};

/// Pre-warming parks connections in the idle set.
#[tokio::test]
async fn create_resource_parks_idle() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(4, 0)).unwrap();

    pool.create_resource().await.unwrap();
    pool.create_resource().await.unwrap();

    let stats = pool.stat();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.idle, 2);
    assert_eq!(stats.acquired, 0);
    assert_eq!(connector.connects(), 2);
}

/// Pre-warming past the cap is rejected without dialing.
#[tokio::test]
async fn create_resource_at_capacity() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(1, 0)).unwrap();

    pool.create_resource().await.unwrap();
    assert!(matches!(
        pool.create_resource().await,
        Err(Error::Exhausted)
    ));
    assert_eq!(connector.connects(), 1);
    assert_eq!(pool.stat().total, 1);
}

/// A released connection is reused instead of dialing a new one.
#[tokio::test]
async fn acquire_reuses_released_connection() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(1, 0)).unwrap();

    let first = pool.acquire().await.unwrap();
    let id = first.id();
    first.release();

    let second = pool.acquire().await.unwrap();
    assert_eq!(second.id(), id);
    assert_eq!(connector.connects(), 1);
    second.release();
}

/// Dropping a handle is equivalent to releasing it.
#[tokio::test]
async fn drop_returns_connection_to_idle() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(2, 0)).unwrap();

    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.stat().acquired, 1);
    drop(conn);

    let stats = pool.stat();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.acquired, 0);
}

/// At capacity, acquire blocks until a handle comes back, then gets the
/// same connection.
#[tokio::test]
async fn blocked_acquire_waits_for_release() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(1, 0)).unwrap();

    let held = pool.acquire().await.unwrap();
    let id = held.id();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.stat().acquired, 1);

    held.release();
    let conn = waiter.await.unwrap().unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(connector.connects(), 1);
    conn.release();
}

/// Destroying a held connection frees capacity for a blocked acquirer,
/// which dials a fresh connection.
#[tokio::test]
async fn destroy_grants_capacity_to_waiter() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(1, 0)).unwrap();

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    held.destroy();
    let conn = waiter.await.unwrap().unwrap();
    assert_eq!(connector.connects(), 2);
    assert_eq!(connector.disconnects(), 1);
    assert_eq!(pool.stat().total, 1);
    conn.release();
}

/// Blocked acquirers are served in arrival order.
#[tokio::test]
async fn blocked_acquires_are_fifo() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(1, 0)).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let held = pool.acquire().await.unwrap();
    let mut waiters = Vec::new();
    for seq in 0..3 {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        waiters.push(tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            order.lock().unwrap().push(seq);
            conn.release();
        }));
        // Establish a distinct arrival order.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    held.release();
    for waiter in waiters {
        waiter.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

/// A zero deadline fails up front and leaves the pool untouched.
#[tokio::test]
async fn zero_deadline_fails_fast() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(1, 0)).unwrap();

    let result = pool.acquire_timeout(Duration::ZERO).await;
    assert!(matches!(result, Err(Error::AcquireTimeout)));
    assert_eq!(pool.stat().total, 0);
    assert_eq!(connector.connects(), 0);
}

/// An expired wait leaves the queue and the accounting clean.
#[tokio::test]
async fn acquire_timeout_unwinds_waiter() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(1, 0)).unwrap();

    let held = pool.acquire().await.unwrap();
    let result = pool.acquire_timeout(Duration::from_millis(20)).await;
    assert!(matches!(result, Err(Error::AcquireTimeout)));

    // The timed-out waiter must not have leaked a queue entry: the release
    // below goes to the idle set, not to a dead waiter.
    held.release();
    let stats = pool.stat();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.idle, 1);
}

/// Failed dials surface to the caller and never leak capacity.
#[tokio::test]
async fn connect_failure_surfaces_and_unwinds() {
    let connector = DuplexConnector::new();
    connector.set_refuse(true);
    let pool = Pool::new(connector.clone(), options(2, 0)).unwrap();

    assert!(matches!(pool.acquire().await, Err(Error::Connect(_))));
    assert_eq!(pool.stat().total, 0);

    connector.set_refuse(false);
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.stat().total, 1);
    conn.release();
}

/// Destroy runs the destructor exactly once per connection.
#[tokio::test]
async fn destroy_runs_destructor_once() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(2, 0)).unwrap();

    let conn = pool.acquire().await.unwrap();
    conn.destroy();
    assert_eq!(connector.disconnects(), 1);
    assert_eq!(pool.stat().total, 0);
}

/// The idle snapshot drains everything at once.
#[tokio::test]
async fn acquire_all_idle_drains_snapshot() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(4, 0)).unwrap();
    for _ in 0..3 {
        pool.create_resource().await.unwrap();
    }

    let handles = pool.acquire_all_idle();
    assert_eq!(handles.len(), 3);
    let stats = pool.stat();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.acquired, 3);

    for handle in handles {
        handle.release();
    }
    assert_eq!(pool.stat().idle, 3);
}

/// Close wakes blocked acquirers and disconnects idle connections; handles
/// still out are disconnected as they come back.
#[tokio::test]
async fn close_wakes_waiters_and_drains_idle() {
    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(2, 0)).unwrap();

    pool.create_resource().await.unwrap();
    let held = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();
    second.release(); // one idle, one held

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    pool.close();
    assert!(matches!(waiter.await.unwrap(), Err(Error::Closed)));
    assert_eq!(connector.disconnects(), 1); // the idle one

    held.release();
    assert_eq!(connector.disconnects(), 2);
    assert_eq!(pool.stat().total, 0);
    assert!(pool.is_closed());
}

/// Capacity and occupancy invariants hold under concurrent churn, and no
/// connection is ever handed to two holders at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_invariants_under_concurrency() {
    const TASKS: usize = 16;
    const ROUNDS: usize = 25;
    const MAX: usize = 4;

    let connector = DuplexConnector::new();
    let pool = Pool::new(connector.clone(), options(MAX, 0)).unwrap();
    let held_ids: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for seq in 0..TASKS {
        let pool = pool.clone();
        let held_ids = Arc::clone(&held_ids);
        tasks.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let conn = pool.acquire().await.unwrap();

                let stats = pool.stat();
                assert!(stats.total <= MAX, "total {} over cap", stats.total);
                assert_eq!(stats.idle + stats.acquired, stats.total);

                assert!(
                    held_ids.lock().unwrap().insert(conn.id()),
                    "connection {} issued twice",
                    conn.id()
                );
                tokio::time::sleep(Duration::from_millis(1)).await;
                held_ids.lock().unwrap().remove(&conn.id());

                if (seq + round) % 5 == 0 {
                    conn.destroy();
                } else {
                    conn.release();
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = pool.stat();
    assert!(stats.total <= MAX);
    assert_eq!(stats.acquired, 0);
    pool.close();
    // Every dialed connection was disconnected exactly once.
    assert_eq!(connector.connects(), connector.disconnects());
}
