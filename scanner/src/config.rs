//! Configuration management for a check-in station.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Station configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Station name, used in logs
    pub station: String,
    /// `PostgreSQL` connection URL; `None` runs the station local-only
    pub database_url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Directory holding the guest snapshot
    pub cache_dir: PathBuf,
    /// How long a scan or registration may take, in seconds
    pub request_timeout_secs: u64,
    /// Delay before the change listener resubscribes, in seconds
    pub listener_retry_secs: u64,
}

impl ScannerConfig {
    /// Load configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `CHECKIN_STATION`: Station name (default: `station`)
    /// - `DATABASE_URL`: `PostgreSQL` URL (default: none, local-only)
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
    /// - `CHECKIN_CACHE_DIR`: Snapshot directory (default: `.checkin`)
    /// - `CHECKIN_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 10)
    /// - `CHECKIN_LISTENER_RETRY_SECS`: Listener resubscribe delay (default: 5)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            station: lookup("CHECKIN_STATION").unwrap_or_else(|| "station".to_string()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            cache_dir: lookup("CHECKIN_CACHE_DIR")
                .map_or_else(|| PathBuf::from(".checkin"), PathBuf::from),
            request_timeout_secs: lookup("CHECKIN_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            listener_retry_secs: lookup("CHECKIN_LISTENER_RETRY_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Listener resubscribe delay.
    #[must_use]
    pub const fn listener_retry(&self) -> Duration {
        Duration::from_secs(self.listener_retry_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ScannerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ScannerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_describe_a_local_only_station() {
        let config = config(&[]);

        assert_eq!(config.station, "station");
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.cache_dir, PathBuf::from(".checkin"));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.listener_retry(), Duration::from_secs(5));
    }

    #[test]
    fn variables_override_defaults() {
        let config = config(&[
            ("CHECKIN_STATION", "north-door"),
            ("DATABASE_URL", "postgres://localhost/checkin"),
            ("DATABASE_MAX_CONNECTIONS", "2"),
            ("CHECKIN_CACHE_DIR", "/var/lib/checkin"),
            ("CHECKIN_REQUEST_TIMEOUT_SECS", "3"),
        ]);

        assert_eq!(config.station, "north-door");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/checkin"));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.cache_dir, PathBuf::from("/var/lib/checkin"));
        assert_eq!(config.request_timeout_secs, 3);
    }

    #[test]
    fn blank_url_and_bad_numbers_fall_back() {
        let config = config(&[("DATABASE_URL", "  "), ("DATABASE_MAX_CONNECTIONS", "many")]);

        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 5);
    }
}
