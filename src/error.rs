//! Error types and error support code.

use std::io;

/// Generalized error type used by all pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pool has been closed.
    #[error("pool is closed")]
    Closed,
    /// No idle connection and no free capacity, and waiting was not requested.
    #[error("pool is exhausted")]
    Exhausted,
    /// Connection acquisition took longer than the specified timeout.
    #[error("connection acquisition timeout")]
    AcquireTimeout,
    /// Establishing a new connection failed.
    #[error("unable to connect: {0}")]
    Connect(#[source] io::Error),
    /// I/O failure on an acquired connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),
    /// Invalid pool configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error indicates a dead or unusable connection.
    ///
    /// Acquisition timeouts and configuration problems say nothing about the
    /// health of any particular connection.
    #[must_use]
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Io(_))
    }
}
