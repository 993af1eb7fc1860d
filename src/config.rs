//! Startup configuration: `config.yaml` loading and validation.
//!
//! Config loading is the one fatal startup path in this service — every
//! other error is logged and the process keeps running.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

fn default_bind_port() -> u16 {
    3868
}
fn default_transport() -> String {
    "TCP".to_string()
}
fn default_socket_timeout() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    10
}
fn default_peer_timeout() -> u64 {
    3600
}
fn default_redis_host() -> String {
    "localhost".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_unix_socket_path() -> String {
    "/var/run/redis/redis-server.sock".to_string()
}
fn default_reporting_interval() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct HssConfig {
    pub bind_ip: Vec<String>,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_socket_timeout")]
    pub client_socket_timeout: u64,
    #[serde(default = "default_request_timeout")]
    pub diameter_request_timeout: u64,
    #[serde(default = "default_peer_timeout")]
    pub active_diameter_peers_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    #[serde(rename = "useUnixSocket")]
    pub use_unix_socket: bool,
    #[serde(rename = "unixSocketPath")]
    pub unix_socket_path: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            use_unix_socket: false,
            unix_socket_path: default_unix_socket_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchmarkingConfig {
    pub enabled: bool,
    pub reporting_interval: u64,
}

impl Default for BenchmarkingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reporting_interval: default_reporting_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub hss: HssConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub benchmarking: BenchmarkingConfig,
}

impl Config {
    /// Load and validate config from a YAML file. The only fatal path in
    /// this service: an error here is printed and the process exits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let data = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;

        let config: Config = serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hss.bind_ip.is_empty() {
            return Err(ConfigError::MissingBindAddress);
        }
        if !self.hss.transport.eq_ignore_ascii_case("TCP") {
            return Err(ConfigError::UnsupportedTransport(self.hss.transport.clone()));
        }
        Ok(())
    }

    /// First configured bind address; only the first `hss.bind_ip` entry is used.
    pub fn bind_address(&self) -> &str {
        &self.hss.bind_ip[0]
    }

    pub fn redis_url(&self) -> String {
        if self.redis.use_unix_socket {
            format!("redis+unix://{}", self.redis.unix_socket_path)
        } else {
            format!("redis://{}:{}", self.redis.host, self.redis.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let yaml = "hss:\n  bind_ip:\n    - \"0.0.0.0\"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.hss.bind_port, 3868);
        assert_eq!(config.hss.transport, "TCP");
        assert_eq!(config.redis.host, "localhost");
        assert!(!config.benchmarking.enabled);
    }

    #[test]
    fn rejects_non_tcp_transport() {
        let yaml = "hss:\n  bind_ip:\n    - \"0.0.0.0\"\n  transport: \"SCTP\"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedTransport(_))
        ));
    }

    #[test]
    fn rejects_empty_bind_ip() {
        let yaml = "hss:\n  bind_ip: []\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingBindAddress)));
    }

    #[test]
    fn redis_url_prefers_unix_socket() {
        let yaml = "hss:\n  bind_ip:\n    - \"0.0.0.0\"\nredis:\n  useUnixSocket: true\n  unixSocketPath: \"/tmp/redis.sock\"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.redis_url(), "redis+unix:///tmp/redis.sock");
    }
}
