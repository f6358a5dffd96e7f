//! Fire-and-forget and request/response send operations on top of the pool.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{connector::Connector, error::Error, pool::Pool, resource::PooledConn};

/// Message send operations layered over a [`Pool`].
///
/// Payloads are opaque byte sequences; any protocol framing (AVPs, session
/// identifiers, command codes) is the caller's business.
pub struct Dispatcher<M: Connector> {
    pool: Pool<M>,
}

impl<M: Connector> Clone for Dispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<M> Dispatcher<M>
where
    M: Connector,
    M::Conn: AsyncWrite + Unpin,
{
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: Pool<M>) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<M> {
        &self.pool
    }

    /// Write one payload and return the connection to the pool.
    ///
    /// No response is expected; use this for one-way telemetry-style
    /// messages.
    ///
    /// # Errors
    ///
    /// Acquisition errors pass through. A write failure destroys the
    /// connection (its state is unknown after a partial write) and surfaces
    /// as [`Error::Io`].
    pub async fn send_single(&self, payload: &[u8]) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        match write_payload(&mut *conn, payload).await {
            Ok(()) => {
                conn.release();
                Ok(())
            }
            Err(error) => {
                debug!(id = conn.id(), %error, "write failed, destroying connection");
                conn.destroy();
                Err(Error::Io(error))
            }
        }
    }

    /// Write several payloads in order over one connection.
    ///
    /// The peer observes each payload fully before any byte of the next.
    ///
    /// # Errors
    ///
    /// The first failed write aborts the remaining payloads, destroys the
    /// connection and surfaces as [`Error::Io`].
    pub async fn send_multiple<I, B>(&self, payloads: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut conn = self.pool.acquire().await?;
        for payload in payloads {
            if let Err(error) = conn.write_all(payload.as_ref()).await {
                debug!(id = conn.id(), %error, "write failed, destroying connection");
                conn.destroy();
                return Err(Error::Io(error));
            }
        }
        match conn.flush().await {
            Ok(()) => {
                conn.release();
                Ok(())
            }
            Err(error) => {
                conn.destroy();
                Err(Error::Io(error))
            }
        }
    }

    /// Write a request and hand the still-acquired connection to the
    /// caller.
    ///
    /// The caller reads the response and then decides the connection's
    /// fate: [`PooledConn::release`] after success or a recoverable timeout,
    /// [`PooledConn::destroy`] after a connection-level failure. Use
    /// [`Verdict::of_error`](crate::Verdict::of_error) to classify response
    /// read errors with the same rule the health checker applies.
    ///
    /// # Errors
    ///
    /// Acquisition errors pass through; a write failure destroys the
    /// connection and surfaces as [`Error::Io`].
    pub async fn send_request(&self, payload: &[u8]) -> Result<PooledConn<M>, Error> {
        let mut conn = self.pool.acquire().await?;
        match write_payload(&mut *conn, payload).await {
            Ok(()) => Ok(conn),
            Err(error) => {
                debug!(id = conn.id(), %error, "write failed, destroying connection");
                conn.destroy();
                Err(Error::Io(error))
            }
        }
    }
}

async fn write_payload<C>(conn: &mut C, payload: &[u8]) -> io::Result<()>
where
    C: AsyncWrite + Unpin,
{
    conn.write_all(payload).await?;
    conn.flush().await
}
