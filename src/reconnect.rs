//! Background maintenance: replenishment, health probing, idle pruning.

use std::cmp::Reverse;

use tokio::{io::AsyncRead, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, trace_span, warn, Instrument};

use crate::{
    connector::Connector,
    health::{self, Verdict},
    pool::Pool,
};

/// Handle to the background maintenance task of a [`Pool`].
///
/// The loop runs every `reconnect_interval` (plus up to `reconnect_jitter`
/// of random extra sleep) until [`Reconnector::shutdown`] is called or the
/// handle is dropped. It is the only source of unsolicited connection
/// creation and destruction; everything else is caller-driven.
pub struct Reconnector {
    /// Maintenance task handle.
    task: Option<JoinHandle<()>>,
    /// Cooperative shutdown signal.
    cancel: CancellationToken,
}

impl Reconnector {
    /// Spawn the maintenance loop for a pool.
    pub fn spawn<M>(pool: Pool<M>) -> Self
    where
        M: Connector,
        M::Conn: AsyncRead + Unpin,
    {
        let cancel = CancellationToken::new();
        let span = trace_span!("pool_maintenance", pool = %pool.options().name);
        let task = tokio::spawn(Self::run(pool, cancel.clone()).instrument(span));
        Self {
            task: Some(task),
            cancel,
        }
    }

    async fn run<M>(pool: Pool<M>, cancel: CancellationToken)
    where
        M: Connector,
        M::Conn: AsyncRead + Unpin,
    {
        loop {
            maintenance_pass(&pool).await;
            if pool.is_closed() {
                break;
            }
            let mut sleep = pool.options().reconnect_interval;
            let jitter = pool.options().reconnect_jitter.as_millis() as u64;
            if jitter > 0 {
                sleep += std::time::Duration::from_millis(fastrand::u64(0..=jitter));
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(sleep) => {}
            }
        }
        debug!("maintenance loop stopped");
    }

    /// Stop the loop, waiting for any in-progress pass to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One full maintenance pass over a pool.
pub(crate) async fn maintenance_pass<M>(pool: &Pool<M>)
where
    M: Connector,
    M::Conn: AsyncRead + Unpin,
{
    if pool.is_closed() {
        return;
    }
    let options = pool.options().clone();

    // Recovery from total outage: get at least one connection back before
    // anything else. If even that fails the server is down; retry next pass.
    if pool.stat().total == 0 {
        if let Err(error) = pool.create_resource().await {
            warn!(%error, "reconnect failed");
            return;
        }
    }

    // Replenish up to the floor.
    while pool.stat().total < options.min_idle {
        if let Err(error) = pool.create_resource().await {
            warn!(%error, "pool replenishment failed");
            break;
        }
    }

    // Prune and probe over a single point-in-time snapshot of the idle set.
    let stats = pool.stat();
    let ceiling = (options.max_resources as f64 * options.idle_ceiling) as usize;
    let mut prunable = if stats.idle > ceiling {
        stats.idle.saturating_sub(options.min_idle)
    } else {
        0
    };
    let mut handles = pool.acquire_all_idle();
    // Longest-idle first, so pruning trims the stalest sockets.
    handles.sort_by_key(|handle| Reverse(handle.idle_for()));
    for mut handle in handles {
        if prunable > 0 && handle.idle_for() >= options.idle_keep_alive {
            trace!(id = handle.id(), "pruning excess idle connection");
            handle.destroy();
            prunable -= 1;
            continue;
        }
        match health::probe(&mut *handle, options.probe_timeout).await {
            Verdict::Alive => handle.release_quietly(),
            verdict => {
                debug!(id = handle.id(), ?verdict, "destroying dead idle connection");
                handle.destroy();
            }
        }
    }

    pool.publish_stats();
}
