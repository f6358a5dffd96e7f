//! Liveness probing for idle connections.
//!
//! An idle session-oriented connection should carry no traffic at all, which
//! makes liveness cheap to check: read one byte under a short deadline. A
//! deadline expiry means the peer is quietly alive; anything else means the
//! connection is no longer usable.

use std::{io, time::Duration};

use tokio::io::{AsyncRead, AsyncReadExt};

/// Classification of a read on a connection that is expected to be quiet.
///
/// The same rule is applied by the health checker to idle connections and by
/// callers of `send_request` to response reads: a timeout is recoverable,
/// everything else is fatal to the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// No data arrived within the deadline; the peer is presumed alive.
    Alive,
    /// Peer shut the connection down in an orderly fashion.
    Eof,
    /// Read failed with a connection-level error (reset, closed socket).
    Failed,
    /// The peer pushed unsolicited bytes on an idle session.
    ///
    /// A session-oriented peer only speaks when spoken to, so this is a
    /// protocol violation; the bytes are discarded and the connection
    /// condemned.
    UnexpectedData,
}

impl Verdict {
    /// Whether the connection may be returned to the idle set.
    #[must_use]
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Alive)
    }

    /// Classify an I/O error the way the liveness probe does.
    ///
    /// Timeout-flavored errors mean "alive but slow"; everything else is
    /// fatal to the connection.
    #[must_use]
    pub fn of_error(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Alive,
            _ => Self::Failed,
        }
    }
}

/// Probe an idle connection with a short-deadline one-byte read.
///
/// Must only be called on a connection held exclusively (for pooled
/// connections, one drained out of the pool via `acquire_all_idle`), so no
/// concurrent caller can observe it mid-probe.
pub async fn probe<C>(conn: &mut C, deadline: Duration) -> Verdict
where
    C: AsyncRead + Unpin,
{
    let mut buf = [0_u8; 1];
    match tokio::time::timeout(deadline, conn.read(&mut buf)).await {
        Err(_elapsed) => Verdict::Alive,
        Ok(Ok(0)) => Verdict::Eof,
        Ok(Ok(_)) => Verdict::UnexpectedData,
        Ok(Err(error)) => Verdict::of_error(&error),
    }
}
