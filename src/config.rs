//! Pool and transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Configuration for the connection pool and its maintenance loop.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PoolOptions {
    /// Name used to label pool metrics.
    ///
    /// Default is "default".
    #[serde(default = "PoolOptions::default_name")]
    pub name: String,
    /// Hard cap on total live connections.
    ///
    /// Default is 8.
    #[serde(default = "PoolOptions::default_max_resources")]
    pub max_resources: usize,
    /// Floor of live connections the reconnector tries to maintain.
    ///
    /// Default is 2.
    #[serde(default = "PoolOptions::default_min_idle")]
    pub min_idle: usize,
    /// Fraction of [`Self::max_resources`] above which idle connections
    /// become eligible for pruning.
    ///
    /// Default is 0.25.
    #[serde(default = "PoolOptions::default_idle_ceiling")]
    pub idle_ceiling: f64,
    /// Base sleep between reconnector passes.
    ///
    /// Default is 5 seconds.
    #[serde(
        default = "PoolOptions::default_reconnect_interval",
        with = "humantime_serde"
    )]
    pub reconnect_interval: Duration,
    /// Maximum random extra sleep added to each reconnector pass, to avoid
    /// thundering-herd reconnects across many client instances.
    ///
    /// Default is 1 second.
    #[serde(
        default = "PoolOptions::default_reconnect_jitter",
        with = "humantime_serde"
    )]
    pub reconnect_jitter: Duration,
    /// Minimum time a connection must sit idle before it may be pruned.
    ///
    /// Default is 60 seconds.
    #[serde(
        default = "PoolOptions::default_idle_keep_alive",
        with = "humantime_serde"
    )]
    pub idle_keep_alive: Duration,
    /// Default bound for blocking acquires.
    ///
    /// Default is 10 seconds.
    #[serde(
        default = "PoolOptions::default_acquire_timeout",
        with = "humantime_serde"
    )]
    pub acquire_timeout: Duration,
    /// Read deadline used by the liveness probe.
    ///
    /// Default is 3 seconds.
    #[serde(
        default = "PoolOptions::default_probe_timeout",
        with = "humantime_serde"
    )]
    pub probe_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            max_resources: Self::default_max_resources(),
            min_idle: Self::default_min_idle(),
            idle_ceiling: Self::default_idle_ceiling(),
            reconnect_interval: Self::default_reconnect_interval(),
            reconnect_jitter: Self::default_reconnect_jitter(),
            idle_keep_alive: Self::default_idle_keep_alive(),
            acquire_timeout: Self::default_acquire_timeout(),
            probe_timeout: Self::default_probe_timeout(),
        }
    }
}

impl PoolOptions {
    /// Default value for [`Self::name`].
    #[must_use]
    #[inline]
    fn default_name() -> String {
        "default".into()
    }

    /// Default value for [`Self::max_resources`].
    #[must_use]
    #[inline]
    fn default_max_resources() -> usize {
        8
    }

    /// Default value for [`Self::min_idle`].
    #[must_use]
    #[inline]
    fn default_min_idle() -> usize {
        2
    }

    /// Default value for [`Self::idle_ceiling`].
    #[must_use]
    #[inline]
    fn default_idle_ceiling() -> f64 {
        0.25
    }

    /// Default value for [`Self::reconnect_interval`].
    #[must_use]
    #[inline]
    fn default_reconnect_interval() -> Duration {
        Duration::from_secs(5)
    }

    /// Default value for [`Self::reconnect_jitter`].
    #[must_use]
    #[inline]
    fn default_reconnect_jitter() -> Duration {
        Duration::from_secs(1)
    }

    /// Default value for [`Self::idle_keep_alive`].
    #[must_use]
    #[inline]
    fn default_idle_keep_alive() -> Duration {
        Duration::from_secs(60)
    }

    /// Default value for [`Self::acquire_timeout`].
    #[must_use]
    #[inline]
    fn default_acquire_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// Default value for [`Self::probe_timeout`].
    #[must_use]
    #[inline]
    fn default_probe_timeout() -> Duration {
        Duration::from_secs(3)
    }

    /// Check invariants between configured limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any limit is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_resources == 0 {
            return Err(Error::Config(
                "max_resources must be greater than zero".into(),
            ));
        }
        if self.min_idle > self.max_resources {
            return Err(Error::Config(
                "min_idle cannot be greater than max_resources".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.idle_ceiling) {
            return Err(Error::Config(
                "idle_ceiling must be a fraction between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for establishing individual transport connections.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConnectOptions {
    /// Server address, in `host:port` form.
    pub addr: String,
    /// TCP keep-alive period.
    ///
    /// Default is 30 seconds.
    #[serde(
        default = "ConnectOptions::default_keepalive_period",
        with = "humantime_serde"
    )]
    pub keepalive_period: Duration,
    /// Time limit for establishing a single connection.
    ///
    /// Default is 10 seconds.
    #[serde(
        default = "ConnectOptions::default_connect_timeout",
        with = "humantime_serde"
    )]
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    /// Create options for an address, leaving everything else at defaults.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            keepalive_period: Self::default_keepalive_period(),
            connect_timeout: Self::default_connect_timeout(),
        }
    }

    /// Default value for [`Self::keepalive_period`].
    #[must_use]
    #[inline]
    fn default_keepalive_period() -> Duration {
        Duration::from_secs(30)
    }

    /// Default value for [`Self::connect_timeout`].
    #[must_use]
    #[inline]
    fn default_connect_timeout() -> Duration {
        Duration::from_secs(10)
    }
}
