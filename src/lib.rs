#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

pub mod config;
mod connector;
mod dispatch;
pub mod error;
pub mod health;
mod metrics;
mod pool;
mod reconnect;
mod resource;

pub use crate::{
    config::{ConnectOptions, PoolOptions},
    connector::{Connector, TcpConnector},
    dispatch::Dispatcher,
    error::Error,
    health::{probe, Verdict},
    metrics::PoolStats,
    pool::Pool,
    reconnect::Reconnector,
    resource::PooledConn,
};
