//! Configuration types for batch-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Main configuration for the [`Orchestrator`](crate::Orchestrator)
///
/// Every field has a sensible default, so `Config::default()` works out of the box.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory transfers are streamed into before being moved into place (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Completion marker storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Buffer size of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            persistence: PersistenceConfig::default(),
            http: HttpConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config {
                message: "event_capacity must be greater than zero".to_string(),
                key: Some("event_capacity".to_string()),
            });
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "temp_dir must not be empty".to_string(),
                key: Some("temp_dir".to_string()),
            });
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(Error::Config {
                message: "user_agent must not be empty".to_string(),
                key: Some("http.user_agent".to_string()),
            });
        }
        Ok(())
    }
}

/// Completion marker storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./batch-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// HTTP client configuration used by the transfer executor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection timeout (default: 30 seconds)
    #[serde(with = "duration_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Longest wait for the response head or the next body chunk
    /// (None = no limit)
    ///
    /// Time spent paused is not counted, so a preempted transfer can sit
    /// idle for any length of time and still resume.
    #[serde(with = "optional_duration_serde", default)]
    pub read_timeout: Option<Duration>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./batch-dl.db")
}

fn default_event_capacity() -> usize {
    1000
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("batch-dl/{}", env!("CARGO_PKG_VERSION"))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.temp_dir, PathBuf::from("./temp"));
        assert_eq!(
            config.persistence.database_path,
            PathBuf::from("./batch-dl.db")
        );
        assert_eq!(config.http.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.http.read_timeout, None);
        assert_eq!(config.event_capacity, 1000);
        assert!(config.http.user_agent.starts_with("batch-dl/"));
    }

    #[test]
    fn durations_are_read_as_seconds() {
        let json = r#"{ "http": { "connect_timeout": 5, "read_timeout": 600 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.http.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.http.read_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn validate_rejects_zero_event_capacity() {
        let config = Config {
            event_capacity: 0,
            ..Default::default()
        };

        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("event_capacity")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn from_json_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "temp_dir": "/var/tmp/packs", "event_capacity": 16 }"#)
            .unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/packs"));
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn from_json_file_reports_missing_file_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_json_file(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(Error::Config { key: None, .. })));
    }
}
