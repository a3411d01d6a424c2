//! Server configuration, loaded from TOML.
//!
//! The teacher parsed a hand-rolled YAML subset and a key=value fallback
//! format by hand; `serde` + `toml` replace both with a real deserializer
//! while keeping the same fields and defaults.

use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_ip() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_max_connections() -> usize {
    1024
}

fn default_keep_alive_secs() -> u64 {
    5
}

fn default_worker_threads() -> usize {
    8
}

fn default_read_buffer_size() -> usize {
    32 * 1024
}

/// Per-server listen configuration (spec.md §6 "Configuration").
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ip")]
    pub ip: IpAddr,
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Per-runtime worker pool configuration (spec.md §6 "Configuration").
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: default_worker_threads(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl ServerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let cfg: ServerConfig = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be > 0".into()));
        }
        if self.runtime.worker_threads == 0 {
            return Err(ConfigError::Invalid("runtime.worker_threads must be > 0".into()));
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ConfigError::Invalid("tls_cert and tls_key must be set together".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_documented_defaults() {
        let cfg: ServerConfig = toml::from_str("port = 8080").unwrap();
        assert_eq!(cfg.max_connections, 1024);
        assert_eq!(cfg.keep_alive_secs, 5);
        assert_eq!(cfg.runtime.worker_threads, 8);
        assert_eq!(cfg.runtime.read_buffer_size, 32 * 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_mismatched_tls_pair() {
        let cfg: ServerConfig = toml::from_str("port = 8080\ntls_cert = \"a.pem\"").unwrap();
        assert!(cfg.validate().is_err());
    }
}
