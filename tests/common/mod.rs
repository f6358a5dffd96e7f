#![allow(dead_code)]

//! Shared test plumbing: an in-memory connector with call counters.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use diampool::{Connector, Error, PoolOptions};
use tokio::io::DuplexStream;

/// Connector producing in-memory duplex pipes instead of real sockets.
///
/// Keeps the server half of every pipe so tests can speak for the peer, and
/// counts constructor/destructor invocations.
#[derive(Clone)]
pub struct DuplexConnector {
    /// Server halves, in connect order. Dropping one makes the matching
    /// client half read EOF and fail writes.
    pub peers: Arc<Mutex<Vec<DuplexStream>>>,
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    /// When set, `connect` fails with a refused-connection error.
    pub refuse: Arc<AtomicBool>,
}

impl DuplexConnector {
    pub fn new() -> Self {
        Self {
            peers: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the oldest stored server half.
    pub fn take_peer(&self) -> DuplexStream {
        self.peers.lock().unwrap().remove(0)
    }

    /// Drop every stored server half, making all pooled connections dead.
    pub fn drop_peers(&self) {
        self.peers.lock().unwrap().clear();
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Connector for DuplexConnector {
    type Conn = DuplexStream;

    async fn connect(&self) -> Result<DuplexStream, Error> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Connect(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused by test connector",
            )));
        }
        let (client, server) = tokio::io::duplex(1024);
        self.peers.lock().unwrap().push(server);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(client)
    }

    fn disconnect(&self, conn: DuplexStream) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        drop(conn);
    }
}

/// Pool options tuned for fast, deterministic tests: pruning disabled,
/// short probe deadline, no jitter.
pub fn options(max_resources: usize, min_idle: usize) -> PoolOptions {
    PoolOptions {
        max_resources,
        min_idle,
        idle_ceiling: 1.0,
        reconnect_interval: Duration::from_millis(100),
        reconnect_jitter: Duration::ZERO,
        idle_keep_alive: Duration::from_secs(600),
        acquire_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_millis(50),
        ..PoolOptions::default()
    }
}
