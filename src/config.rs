//! Application configuration.
//!
//! Tunables live in a `config.json` next to the executable. A missing file
//! yields defaults; zero or absent fields keep their defaults, so a partial
//! config is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "config.json";

/// Runtime tunables for health checking, reconnection and the UI.
#[derive(Debug, Clone)]
pub struct Config {
    /// How often to probe a running service's local port.
    pub health_check_interval: Duration,
    /// Timeout for each individual probe.
    pub health_check_timeout: Duration,
    /// Consecutive probe failures before a service is considered lost.
    pub health_check_fail_count: u32,
    /// Base UI refresh cadence.
    pub ui_refresh_rate: Duration,
    /// Backoff base for the first reconnect attempt.
    pub reconnect_base: Duration,
    /// Backoff ceiling.
    pub reconnect_cap: Duration,
    /// Hard ceiling on reconnect attempts; beyond it the service parks in ERROR.
    pub max_reconnects: u32,
    /// Max size of the rotating log file in MB (contract for the log sink).
    pub log_max_size: u64,
    /// Number of log backups to keep (contract for the log sink).
    pub log_max_backups: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(2),
            health_check_timeout: Duration::from_secs(1),
            health_check_fail_count: 2,
            ui_refresh_rate: Duration::from_millis(500),
            reconnect_base: Duration::from_secs(2),
            reconnect_cap: Duration::from_secs(30),
            max_reconnects: 10,
            log_max_size: 10,
            log_max_backups: 3,
        }
    }
}

/// On-disk shape: durations stored as plain integers (seconds/milliseconds)
/// so the file stays hand-editable.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default)]
    health_check_interval: u64, // seconds
    #[serde(default)]
    health_check_timeout: u64, // seconds
    #[serde(default)]
    health_check_fail_count: u32,
    #[serde(default)]
    ui_refresh_rate: u64, // milliseconds
    #[serde(default)]
    reconnect_base: u64, // seconds
    #[serde(default)]
    reconnect_cap: u64, // seconds
    #[serde(default)]
    max_reconnects: u32,
    #[serde(default)]
    log_max_size: u64,
    #[serde(default)]
    log_max_backups: u32,
}

impl Config {
    /// Load configuration from `<exe-dir>/config.json`, or defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        let mut cfg = Config::default();

        if !path.exists() {
            return Ok(cfg);
        }

        let data = std::fs::read_to_string(&path)?;
        let raw: RawConfig = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        if raw.health_check_interval > 0 {
            cfg.health_check_interval = Duration::from_secs(raw.health_check_interval);
        }
        if raw.health_check_timeout > 0 {
            cfg.health_check_timeout = Duration::from_secs(raw.health_check_timeout);
        }
        if raw.health_check_fail_count > 0 {
            cfg.health_check_fail_count = raw.health_check_fail_count;
        }
        if raw.ui_refresh_rate > 0 {
            cfg.ui_refresh_rate = Duration::from_millis(raw.ui_refresh_rate);
        }
        if raw.reconnect_base > 0 {
            cfg.reconnect_base = Duration::from_secs(raw.reconnect_base);
        }
        if raw.reconnect_cap > 0 {
            cfg.reconnect_cap = Duration::from_secs(raw.reconnect_cap);
        }
        if raw.max_reconnects > 0 {
            cfg.max_reconnects = raw.max_reconnects;
        }
        if raw.log_max_size > 0 {
            cfg.log_max_size = raw.log_max_size;
        }
        if raw.log_max_backups > 0 {
            cfg.log_max_backups = raw.log_max_backups;
        }

        Ok(cfg)
    }
}

/// Directory of the running executable, falling back to the current directory.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn config_path() -> PathBuf {
    exe_dir().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(dir.path().join("config.json")).unwrap();
        assert_eq!(cfg.health_check_interval, Duration::from_secs(2));
        assert_eq!(cfg.health_check_fail_count, 2);
        assert_eq!(cfg.max_reconnects, 10);
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"health_check_interval": 5}"#).unwrap();

        let cfg = Config::load_from(path).unwrap();
        assert_eq!(cfg.health_check_interval, Duration::from_secs(5));
        assert_eq!(cfg.health_check_timeout, Duration::from_secs(1));
        assert_eq!(cfg.ui_refresh_rate, Duration::from_millis(500));
    }

    #[test]
    fn zero_fields_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"health_check_fail_count": 0, "max_reconnects": 0}"#).unwrap();

        let cfg = Config::load_from(path).unwrap();
        assert_eq!(cfg.health_check_fail_count, 2);
        assert_eq!(cfg.max_reconnects, 10);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(path).is_err());
    }
}
