//! Embedding-supplied configuration: a plain `serde`-derived struct loaded
//! from a TOML file via `serdeconv`, with a `Default` impl good enough to
//! run a daemon on the loopback interface with no file at all.

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 28015;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoleConfig {
    Daemon,
    Slave { daemon_endpoint: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write every raw sent/received datagram to `networking.log`.
    pub log_networking: bool,
    /// Emit trace-level structured logs in addition to the raw datagram log.
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> LoggingConfig {
        LoggingConfig {
            log_networking: false,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorConfig {
    pub port: u16,
    pub role: RoleConfig,
    pub logging: LoggingConfig,
}

impl Default for RazorConfig {
    fn default() -> RazorConfig {
        RazorConfig {
            port: DEFAULT_PORT,
            role: RoleConfig::Daemon,
            logging: LoggingConfig::default(),
        }
    }
}

impl RazorConfig {
    /// Loads configuration from a TOML file, panicking with a descriptive
    /// message on failure - this mirrors `GameConfig::load`, which is only
    /// ever called once at startup where a panic is an acceptable failure
    /// mode.
    pub fn load<P: AsRef<Path>>(path: P) -> RazorConfig {
        serdeconv::from_toml_file(path).expect("Error loading razor configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_daemon_on_default_port() {
        let config = RazorConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(matches!(config.role, RoleConfig::Daemon));
        assert!(!config.logging.log_networking);
    }
}
