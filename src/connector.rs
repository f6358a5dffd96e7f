//! Connection constructors and destructors.

use std::io;

use socket2::{SockRef, TcpKeepalive};
use tokio::{net::TcpStream, time::timeout};
use tracing::debug;

use crate::{config::ConnectOptions, error::Error};

/// Supplies the pool with new connections and disposes of dead ones.
///
/// The pool calls [`Connector::connect`] exactly once per resource when it
/// is created, and [`Connector::disconnect`] exactly once when it is
/// destroyed. The two are never invoked concurrently for the same resource.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connection type managed by the pool.
    type Conn: Send + 'static;

    /// Dial and configure a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if dialing or configuring the transport
    /// fails. The failure is surfaced to the caller that triggered the
    /// construction and retried by the reconnector on its next pass.
    async fn connect(&self) -> Result<Self::Conn, Error>;

    /// Release a connection's underlying OS resources.
    ///
    /// Must not fail, even if the connection is already closed. The default
    /// implementation just drops the value, which closes any transport that
    /// ties its socket to its lifetime.
    fn disconnect(&self, conn: Self::Conn) {
        drop(conn);
    }
}

/// [`Connector`] for plain TCP transports with keep-alive enabled.
pub struct TcpConnector {
    /// Transport configuration.
    options: ConnectOptions,
}

impl TcpConnector {
    /// Create a connector from transport options.
    #[must_use]
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    /// Transport options in use.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    type Conn = TcpStream;

    async fn connect(&self) -> Result<TcpStream, Error> {
        let stream = timeout(
            self.options.connect_timeout,
            TcpStream::connect(&self.options.addr),
        )
        .await
        .map_err(|_| {
            Error::Connect(io::Error::new(
                io::ErrorKind::TimedOut,
                "connection attempt timed out",
            ))
        })?
        .map_err(Error::Connect)?;
        let keepalive = TcpKeepalive::new().with_time(self.options.keepalive_period);
        SockRef::from(&stream)
            .set_tcp_keepalive(&keepalive)
            .map_err(Error::Connect)?;
        debug!(addr = %self.options.addr, "connection established");
        Ok(stream)
    }
}
