//! Bounded, thread-safe container of pooled connections.
//!
//! All capacity accounting and the idle/waiter queues live behind a single
//! mutex, so the `total <= max` invariant holds under arbitrary concurrent
//! acquire/release/destroy traffic. Released and destroyed slots are handed
//! directly to the longest-waiting acquirer, which keeps the waiter order
//! FIFO and prevents barging.

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::{io::AsyncRead, sync::oneshot};
use tracing::{debug, debug_span, trace, Instrument};

use crate::{
    config::PoolOptions,
    connector::Connector,
    error::Error,
    metrics::{pool_kv, Metrics, PoolStats, POOL_METRICS},
    reconnect,
    resource::{PooledConn, Slot},
};

/// Hand-off message for a blocked acquire.
enum Wake<C> {
    /// A connection passed directly from a release to the waiter.
    Ready(Slot<C>),
    /// A freed capacity slot; the waiter constructs its own connection.
    Grant,
}

/// One queued acquirer.
struct Waiter<C> {
    /// Identity used to unqueue the waiter if it gives up.
    id: u64,
    /// Hand-off channel. Dropping the receiver invalidates the entry.
    tx: oneshot::Sender<Wake<C>>,
}

/// Mutable pool state, guarded by a single mutex.
struct Core<C> {
    /// Idle connections, longest-idle at the front.
    idle: VecDeque<Slot<C>>,
    /// Live connections plus in-flight construction reservations.
    total: usize,
    /// Blocked acquirers, in arrival order.
    waiters: VecDeque<Waiter<C>>,
    /// Set once by `close`; permanent.
    closed: bool,
    next_slot_id: u64,
    next_waiter_id: u64,
}

impl<C> Core<C> {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            total: 0,
            waiters: VecDeque::new(),
            closed: false,
            next_slot_id: 1,
            next_waiter_id: 1,
        }
    }

    /// Pass a freed capacity slot to the next live waiter, or shrink the
    /// total. The grantee constructs its own connection against the count
    /// this slot keeps reserved.
    fn free_capacity(&mut self) {
        if !self.closed {
            while let Some(waiter) = self.waiters.pop_front() {
                if waiter.tx.send(Wake::Grant).is_ok() {
                    return;
                }
            }
        }
        self.total -= 1;
    }
}

/// Shared pool internals.
pub(crate) struct PoolInner<M: Connector> {
    connector: M,
    options: PoolOptions,
    core: Mutex<Core<M::Conn>>,
    label: [opentelemetry::KeyValue; 1],
    metrics: Arc<Metrics>,
}

impl<M: Connector> PoolInner<M> {
    fn checkout(this: &Arc<Self>, slot: Slot<M::Conn>) -> PooledConn<M> {
        trace!(id = slot.id, "connection checked out");
        PooledConn::new(slot, Arc::clone(this))
    }

    /// Return a slot to the pool: hand it to the longest-waiting acquirer
    /// if one exists, otherwise park it in the idle set.
    pub(crate) fn release_slot(&self, mut slot: Slot<M::Conn>, refresh_idle_age: bool) {
        if refresh_idle_age {
            slot.last_used = Instant::now();
        }
        let mut core = self.core.lock();
        if core.closed {
            core.total -= 1;
            drop(core);
            self.connector.disconnect(slot.conn);
            return;
        }
        loop {
            match core.waiters.pop_front() {
                Some(waiter) => match waiter.tx.send(Wake::Ready(slot)) {
                    Ok(()) => return,
                    // The waiter gave up; reclaim the slot and try the next.
                    Err(Wake::Ready(returned)) => slot = returned,
                    Err(Wake::Grant) => unreachable!("send returns the value it was given"),
                },
                None => {
                    core.idle.push_back(slot);
                    return;
                }
            }
        }
    }

    /// Tear a slot down, run the destructor once, and free the capacity.
    pub(crate) fn destroy_slot(&self, slot: Slot<M::Conn>) {
        {
            let mut core = self.core.lock();
            core.free_capacity();
        }
        debug!(id = slot.id, "connection destroyed");
        self.connector.disconnect(slot.conn);
    }

    /// Build a new connection against an already-reserved capacity slot.
    ///
    /// The reservation is unwound if dialing fails or the future is dropped
    /// mid-dial.
    async fn construct(this: &Arc<Self>) -> Result<PooledConn<M>, Error> {
        let mut guard = ReservationGuard {
            pool: this.as_ref(),
            armed: true,
        };
        let conn = this.connector.connect().await?;
        guard.disarm();
        let slot = {
            let mut core = this.core.lock();
            if core.closed {
                core.total -= 1;
                drop(core);
                this.connector.disconnect(conn);
                return Err(Error::Closed);
            }
            let id = core.next_slot_id;
            core.next_slot_id += 1;
            Slot::new(id, conn)
        };
        Ok(Self::checkout(this, slot))
    }

    async fn acquire_inner(this: &Arc<Self>) -> Result<PooledConn<M>, Error> {
        let plan = {
            let mut core = this.core.lock();
            if core.closed {
                return Err(Error::Closed);
            }
            if let Some(slot) = core.idle.pop_front() {
                Plan::Ready(slot)
            } else if core.total < this.options.max_resources {
                core.total += 1;
                Plan::Construct
            } else {
                let id = core.next_waiter_id;
                core.next_waiter_id += 1;
                let (tx, rx) = oneshot::channel();
                core.waiters.push_back(Waiter { id, tx });
                Plan::Wait(id, rx)
            }
        };
        match plan {
            Plan::Ready(slot) => Ok(Self::checkout(this, slot)),
            Plan::Construct => Self::construct(this).await,
            Plan::Wait(id, rx) => {
                let mut guard = WaitGuard {
                    pool: this.as_ref(),
                    id,
                    rx,
                    done: false,
                };
                match guard.wait().await? {
                    Wake::Ready(slot) => Ok(Self::checkout(this, slot)),
                    Wake::Grant => Self::construct(this).await,
                }
            }
        }
    }
}

/// Decision taken under the core lock for one acquire call.
enum Plan<C> {
    Ready(Slot<C>),
    Construct,
    Wait(u64, oneshot::Receiver<Wake<C>>),
}

/// Unwinds a capacity reservation if construction never completes.
struct ReservationGuard<'p, M: Connector> {
    pool: &'p PoolInner<M>,
    armed: bool,
}

impl<M: Connector> ReservationGuard<'_, M> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<M: Connector> Drop for ReservationGuard<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            let mut core = self.pool.core.lock();
            core.free_capacity();
        }
    }
}

/// Queued acquirer that cleans up after itself when timed out or dropped.
struct WaitGuard<'p, M: Connector> {
    pool: &'p PoolInner<M>,
    id: u64,
    rx: oneshot::Receiver<Wake<M::Conn>>,
    done: bool,
}

impl<M: Connector> WaitGuard<'_, M> {
    async fn wait(&mut self) -> Result<Wake<M::Conn>, Error> {
        let wake = (&mut self.rx).await;
        self.done = true;
        // Senders only vanish wholesale when the pool closes.
        wake.map_err(|_| Error::Closed)
    }
}

impl<M: Connector> Drop for WaitGuard<'_, M> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut core = self.pool.core.lock();
        if let Some(pos) = core.waiters.iter().position(|w| w.id == self.id) {
            drop(core.waiters.remove(pos));
            return;
        }
        // Already unqueued, so a hand-off may be sitting in the channel.
        match self.rx.try_recv() {
            Ok(Wake::Ready(slot)) => {
                drop(core);
                self.pool.release_slot(slot, false);
            }
            Ok(Wake::Grant) => core.free_capacity(),
            Err(_) => {}
        }
    }
}

/// Bounded pool of live connections to a single fixed-address server.
///
/// Cheap to clone; all clones share the same state. Connections are created
/// lazily up to the configured cap, checked out as exclusive
/// [`PooledConn`] handles, and probed for liveness by the background
/// [`Reconnector`](crate::Reconnector).
pub struct Pool<M: Connector> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Connector> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Connector> Pool<M> {
    /// Create a pool over a connector.
    ///
    /// No connections are dialed up front; use [`Pool::create_resource`] or
    /// run a [`Reconnector`](crate::Reconnector) to warm the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` fail validation.
    pub fn new(connector: M, options: PoolOptions) -> Result<Self, Error> {
        options.validate()?;
        let label = pool_kv(options.name.clone());
        let metrics = Arc::clone(&POOL_METRICS);
        metrics.record_limits(&label, options.max_resources, options.min_idle);
        Ok(Self {
            inner: Arc::new(PoolInner {
                connector,
                options,
                core: Mutex::new(Core::new()),
                label,
                metrics,
            }),
        })
    }

    /// Pool configuration.
    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Acquire a connection, waiting up to the configured acquire timeout.
    ///
    /// Prefers an idle connection; dials a new one when below the cap;
    /// otherwise queues behind earlier acquirers until a slot frees.
    ///
    /// # Errors
    ///
    /// [`Error::AcquireTimeout`] when the wait expires, [`Error::Closed`]
    /// once the pool is closed, [`Error::Connect`] if a fresh dial fails.
    pub async fn acquire(&self) -> Result<PooledConn<M>, Error> {
        self.acquire_timeout(self.inner.options.acquire_timeout)
            .await
    }

    /// Acquire a connection with an explicit wait bound.
    ///
    /// A zero timeout fails immediately without touching pool state.
    ///
    /// # Errors
    ///
    /// Same as [`Pool::acquire`].
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConn<M>, Error> {
        if timeout.is_zero() {
            return Err(Error::AcquireTimeout);
        }
        let started = Instant::now();
        let span = debug_span!("pool_acquire", pool = %self.inner.options.name);
        let conn = match tokio::time::timeout(timeout, PoolInner::acquire_inner(&self.inner))
            .instrument(span)
            .await
        {
            Ok(result) => result?,
            Err(_elapsed) => return Err(Error::AcquireTimeout),
        };
        self.inner
            .metrics
            .wait_time
            .record(started.elapsed().as_secs_f64(), &self.inner.label);
        Ok(conn)
    }

    /// Instantly acquire an idle connection.
    ///
    /// Never dials: establishing a connection cannot be done without
    /// waiting.
    ///
    /// # Errors
    ///
    /// [`Error::Exhausted`] if no idle connection is available,
    /// [`Error::Closed`] once the pool is closed.
    pub fn try_acquire(&self) -> Result<PooledConn<M>, Error> {
        let slot = {
            let mut core = self.inner.core.lock();
            if core.closed {
                return Err(Error::Closed);
            }
            core.idle.pop_front().ok_or(Error::Exhausted)?
        };
        Ok(PoolInner::checkout(&self.inner, slot))
    }

    /// Dial one connection out-of-band and park it in the idle set (or hand
    /// it straight to a blocked acquirer). Used to pre-warm the pool.
    ///
    /// # Errors
    ///
    /// [`Error::Exhausted`] when the pool is already at capacity,
    /// [`Error::Connect`] if dialing fails, [`Error::Closed`] once the pool
    /// is closed.
    pub async fn create_resource(&self) -> Result<(), Error> {
        {
            let mut core = self.inner.core.lock();
            if core.closed {
                return Err(Error::Closed);
            }
            if core.total >= self.inner.options.max_resources {
                return Err(Error::Exhausted);
            }
            core.total += 1;
        }
        let conn = PoolInner::construct(&self.inner).await?;
        conn.release();
        Ok(())
    }

    /// Atomically check out every currently idle connection.
    ///
    /// The health checker runs its probes over this snapshot, so no other
    /// caller can ever observe a connection mid-probe. The snapshot reflects
    /// a single point in time and is not restartable.
    #[must_use]
    pub fn acquire_all_idle(&self) -> Vec<PooledConn<M>> {
        let slots: Vec<_> = {
            let mut core = self.inner.core.lock();
            core.idle.drain(..).collect()
        };
        slots
            .into_iter()
            .map(|slot| PoolInner::checkout(&self.inner, slot))
            .collect()
    }

    /// Point-in-time occupancy snapshot.
    #[must_use]
    pub fn stat(&self) -> PoolStats {
        let core = self.inner.core.lock();
        PoolStats {
            max: self.inner.options.max_resources,
            total: core.total,
            idle: core.idle.len(),
            acquired: core.total - core.idle.len(),
        }
    }

    /// Whether [`Pool::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.core.lock().closed
    }

    /// Close the pool.
    ///
    /// Blocked acquirers are woken and fail with [`Error::Closed`], idle
    /// connections are disconnected, and every subsequent operation fails.
    /// Connections still checked out are disconnected as their handles come
    /// back. Safe to call more than once.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut core = self.inner.core.lock();
            if core.closed {
                return;
            }
            core.closed = true;
            // Dropping the senders fails every queued receiver.
            core.waiters.clear();
            let drained: Vec<_> = core.idle.drain(..).collect();
            core.total -= drained.len();
            drained
        };
        for slot in drained {
            self.inner.connector.disconnect(slot.conn);
        }
        debug!(pool = %self.inner.options.name, "pool closed");
    }

    /// Record the current occupancy snapshot to the process-wide meter.
    ///
    /// The sample rate is the caller's choice; the background reconnector
    /// publishes once per pass.
    pub fn publish_stats(&self) {
        let stats = self.stat();
        self.inner.metrics.record_stats(&self.inner.label, &stats);
    }
}

impl<M> Pool<M>
where
    M: Connector,
    M::Conn: AsyncRead + Unpin,
{
    /// Run one maintenance pass: recover from a total outage, replenish the
    /// idle floor, prune excess idle connections and probe the rest for
    /// liveness.
    ///
    /// The background [`Reconnector`](crate::Reconnector) calls this
    /// periodically; it is public so embedders with their own scheduling can
    /// drive maintenance directly.
    pub async fn maintain(&self) {
        reconnect::maintenance_pass(self).await;
    }
}
