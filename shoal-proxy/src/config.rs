//! Proxy configuration.
//!
//! Configuration is a small YAML file, frozen once loaded:
//!
//! ```yaml
//! proxy_port: 6379
//! redis_nodes:
//!   - "127.0.0.1:7000"
//!   - "127.0.0.1:7001"
//! auto_redirect: true
//! log_level: info
//! log_file: ""
//! ```
//!
//! A missing file falls back to the documented defaults. A file that exists
//! but does not parse or validate is fatal: a proxy started against the
//! wrong seed list fails later and in a worse place.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for this schema.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configuration parsed but fails validation.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Log verbosity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-command tracing.
    Debug,
    /// Lifecycle and topology events.
    #[default]
    Info,
    /// Degraded-but-serving conditions.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Converts to the subscriber's level type.
    #[must_use]
    pub const fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// The frozen configuration record.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Port the proxy listens on.
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    /// Seed backend addresses used to bootstrap the topology.
    #[serde(default = "default_redis_nodes")]
    pub redis_nodes: Vec<String>,
    /// Whether MOVED/ASK redirections are followed transparently.
    #[serde(default = "default_auto_redirect")]
    pub auto_redirect: bool,
    /// Log verbosity threshold.
    #[serde(default)]
    pub log_level: LogLevel,
    /// Log file path; empty means stderr.
    #[serde(default)]
    pub log_file: String,
}

fn default_proxy_port() -> u16 {
    6379
}

fn default_redis_nodes() -> Vec<String> {
    vec![
        "127.0.0.1:7000".to_string(),
        "127.0.0.1:7001".to_string(),
        "127.0.0.1:7002".to_string(),
    ]
}

fn default_auto_redirect() -> bool {
    true
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_port: default_proxy_port(),
            redis_nodes: default_redis_nodes(),
            auto_redirect: default_auto_redirect(),
            log_level: LogLevel::default(),
            log_file: String::new(),
        }
    }
}

impl ProxyConfig {
    /// Loads configuration from a YAML file.
    ///
    /// A missing file yields the defaults; anything else that goes wrong is
    /// fatal.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the rest of the proxy relies on.
    ///
    /// # Errors
    /// Returns an error when the seed list is empty or an entry is not a
    /// `host:port` address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_nodes.is_empty() {
            return Err(ConfigError::Invalid {
                message: "redis_nodes must list at least one seed".to_string(),
            });
        }

        for node in &self.redis_nodes {
            let valid = node
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(ConfigError::Invalid {
                    message: format!("invalid seed address {node:?} (expected host:port)"),
                });
            }
        }

        Ok(())
    }

    /// Returns the address to bind the listener on (all interfaces).
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.proxy_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.proxy_port, 6379);
        assert_eq!(config.redis_nodes.len(), 3);
        assert_eq!(config.redis_nodes[0], "127.0.0.1:7000");
        assert!(config.auto_redirect);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.log_file.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ProxyConfig::load(Path::new("/nonexistent/shoal.yaml")).unwrap();
        assert_eq!(config.proxy_port, 6379);
        assert_eq!(config.redis_nodes.len(), 3);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "proxy_port: 6380\nredis_nodes: [\"10.0.0.1:7000\", \"10.0.0.2:7000\"]\nauto_redirect: false\nlog_level: debug\nlog_file: \"/tmp/shoal.log\"\n"
        )
        .unwrap();

        let config = ProxyConfig::load(file.path()).unwrap();
        assert_eq!(config.proxy_port, 6380);
        assert_eq!(config.redis_nodes, vec!["10.0.0.1:7000", "10.0.0.2:7000"]);
        assert!(!config.auto_redirect);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.log_file, "/tmp/shoal.log");
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proxy_port: 7777").unwrap();

        let config = ProxyConfig::load(file.path()).unwrap();
        assert_eq!(config.proxy_port, 7777);
        assert!(config.auto_redirect);
        assert_eq!(config.redis_nodes.len(), 3);
    }

    #[test]
    fn test_unparsable_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "redis_nodes: {{not yaml").unwrap();
        assert!(matches!(
            ProxyConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_seed_list_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "redis_nodes: []").unwrap();
        assert!(matches!(
            ProxyConfig::load(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_bad_seed_addresses_rejected() {
        for node in ["nohost", "host:", ":7000", "host:notaport", "host:99999"] {
            let config = ProxyConfig {
                redis_nodes: vec![node.to_string()],
                ..ProxyConfig::default()
            };
            assert!(config.validate().is_err(), "{node} should be rejected");
        }
    }

    #[test]
    fn test_log_level_parsing() {
        let config: ProxyConfig = serde_yaml::from_str("log_level: warn").unwrap();
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.log_level.as_tracing(), tracing::Level::WARN);

        assert!(serde_yaml::from_str::<ProxyConfig>("log_level: loud").is_err());
    }
}
