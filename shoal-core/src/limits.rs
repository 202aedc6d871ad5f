//! System limits and configuration bounds.
//!
//! Put limits on everything: every pool, buffer, and retry loop has an
//! explicit maximum so the proxy stays predictable under misbehaving
//! clients and backends.

use std::time::Duration;

/// System-wide limits for the Shoal proxy.
///
/// All limits are explicit. The defaults match the behavior of the proxy
/// as deployed: small bounded pools, short probes, generous reply windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Redirection limits.
    /// Maximum number of MOVED/ASK hops followed for one client request.
    pub max_redirects: u32,

    // Connection pool limits.
    /// Maximum sockets (idle + checked out) per backend node.
    pub pool_size_per_node: u32,

    // Codec limits.
    /// Maximum number of arguments accepted in one client command.
    pub max_command_args: u32,
    /// Maximum size of a single bulk string payload in bytes.
    pub max_bulk_bytes: u64,
    /// Maximum nesting depth of array replies.
    pub max_reply_depth: u32,

    // Timeout limits (in microseconds).
    /// Deadline for dialing a backend.
    pub connect_timeout_us: u64,
    /// Deadline for reading one complete backend reply.
    pub reply_timeout_us: u64,
    /// Deadline for the idle-socket liveness probe.
    pub probe_timeout_us: u64,

    // Topology refresh limits (in microseconds).
    /// Interval between topology refresh ticks.
    pub refresh_interval_us: u64,
    /// Age after which the cached topology counts as stale.
    pub staleness_threshold_us: u64,
}

impl Limits {
    /// Creates limits with the default deployment values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_redirects: 5,

            pool_size_per_node: 10,

            // Codec: 1M args rejects runaway array headers; 512 MB is the
            // protocol's own bulk ceiling; 32 levels covers any real reply.
            max_command_args: 1024 * 1024,
            max_bulk_bytes: 512 * 1024 * 1024,
            max_reply_depth: 32,

            // Timeouts: 5 s connect, 60 s reply, 100 ms probe.
            connect_timeout_us: 5 * 1_000_000,
            reply_timeout_us: 60 * 1_000_000,
            probe_timeout_us: 100 * 1000,

            // Refresh every 30 s; a map older than 30 s is stale.
            refresh_interval_us: 30 * 1_000_000,
            staleness_threshold_us: 30 * 1_000_000,
        }
    }

    /// Deadline for dialing a backend.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_micros(self.connect_timeout_us)
    }

    /// Deadline for reading one complete backend reply.
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_micros(self.reply_timeout_us)
    }

    /// Deadline for the idle-socket liveness probe.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_micros(self.probe_timeout_us)
    }

    /// Interval between topology refresh ticks.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_micros(self.refresh_interval_us)
    }

    /// Age after which the cached topology counts as stale.
    #[must_use]
    pub const fn staleness_threshold(&self) -> Duration {
        Duration::from_micros(self.staleness_threshold_us)
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error describing the first inconsistency found.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_redirects == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_redirects",
                reason: "must be positive",
            });
        }
        if self.pool_size_per_node == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "pool_size_per_node",
                reason: "must be positive",
            });
        }
        if self.max_command_args == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_command_args",
                reason: "must be positive",
            });
        }
        if self.max_reply_depth == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_reply_depth",
                reason: "must be positive",
            });
        }
        // The probe must be strictly tighter than a real reply read, or an
        // idle probe could stall a checkout for the full reply window.
        if self.probe_timeout_us >= self.reply_timeout_us {
            return Err(crate::Error::InvalidArgument {
                name: "probe_timeout_us",
                reason: "must be < reply_timeout_us",
            });
        }
        if self.refresh_interval_us == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "refresh_interval_us",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_valid() {
        let limits = Limits::new();
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_probe_must_be_tighter_than_reply() {
        let mut limits = Limits::new();
        limits.probe_timeout_us = limits.reply_timeout_us;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_zero_redirects_invalid() {
        let mut limits = Limits::new();
        limits.max_redirects = 0;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let limits = Limits::new();
        assert_eq!(limits.connect_timeout(), Duration::from_secs(5));
        assert_eq!(limits.reply_timeout(), Duration::from_secs(60));
        assert_eq!(limits.probe_timeout(), Duration::from_millis(100));
        assert_eq!(limits.refresh_interval(), Duration::from_secs(30));
    }
}
