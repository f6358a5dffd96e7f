//! Checkout handle for pooled connections.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{connector::Connector, pool::PoolInner};

/// One pooled connection plus pool-private bookkeeping.
pub(crate) struct Slot<C> {
    /// Identity, unique within the owning pool.
    pub(crate) id: u64,
    /// The connection itself.
    pub(crate) conn: C,
    /// When the connection was established.
    pub(crate) created_at: Instant,
    /// When the connection last went idle.
    pub(crate) last_used: Instant,
}

impl<C> Slot<C> {
    pub(crate) fn new(id: u64, conn: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            conn,
            created_at: now,
            last_used: now,
        }
    }
}

/// Exclusive handle to a connection checked out of a pool.
///
/// Dereferences to the connection itself. Dropping the handle returns the
/// connection to the idle set; after any I/O failure call
/// [`PooledConn::destroy`] instead, since a partially written connection is
/// in an unknown state.
///
/// Both [`PooledConn::release`] and [`PooledConn::destroy`] consume the
/// handle, so a connection cannot be released twice, and the pool destructor
/// runs at most once per connection.
#[must_use]
pub struct PooledConn<M: Connector> {
    /// Checked-out slot. `Some` until the handle is consumed.
    slot: Option<Slot<M::Conn>>,
    /// Owning pool.
    pool: Arc<PoolInner<M>>,
}

impl<M: Connector> PooledConn<M> {
    pub(crate) fn new(slot: Slot<M::Conn>, pool: Arc<PoolInner<M>>) -> Self {
        Self {
            slot: Some(slot),
            pool,
        }
    }

    /// Identity of the underlying connection, unique within its pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.slot.as_ref().unwrap().id
    }

    /// Age of the connection since it was established.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.slot.as_ref().unwrap().created_at.elapsed()
    }

    /// Time since the connection last went idle.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.slot.as_ref().unwrap().last_used.elapsed()
    }

    /// Return the connection to the pool's idle set.
    ///
    /// Equivalent to dropping the handle, but reads better at call sites
    /// that hand connections back explicitly.
    pub fn release(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release_slot(slot, true);
        }
    }

    /// Return the connection to the idle set without refreshing its idle
    /// age. Used by the health checker, whose probe is not real traffic.
    pub(crate) fn release_quietly(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release_slot(slot, false);
        }
    }

    /// Tear the connection down and free its capacity slot.
    ///
    /// The pool destructor runs exactly once; the freed slot wakes one
    /// blocked acquire, if any is waiting.
    pub fn destroy(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.destroy_slot(slot);
        }
    }
}

impl<M: Connector> Deref for PooledConn<M> {
    type Target = M::Conn;

    fn deref(&self) -> &Self::Target {
        &self.slot.as_ref().unwrap().conn
    }
}

impl<M: Connector> DerefMut for PooledConn<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot.as_mut().unwrap().conn
    }
}

impl<M: Connector> AsRef<M::Conn> for PooledConn<M> {
    fn as_ref(&self) -> &M::Conn {
        self
    }
}

impl<M: Connector> AsMut<M::Conn> for PooledConn<M> {
    fn as_mut(&mut self) -> &mut M::Conn {
        self
    }
}

impl<M: Connector> fmt::Debug for PooledConn<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("PooledConn");
        match &self.slot {
            Some(slot) => dbg.field("id", &slot.id).finish(),
            None => dbg.field("consumed", &true).finish(),
        }
    }
}

impl<M: Connector> Drop for PooledConn<M> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release_slot(slot, true);
        }
    }
}
