//! Configuration for the lock authority

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix (`KEYLOCK_HANDOFF_TIMEOUT_MS`, ...)
pub const ENV_PREFIX: &str = "KEYLOCK";

/// Authority configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// How long an offered waiter has to acknowledge before it is skipped
    #[serde(default = "default_handoff_timeout")]
    pub handoff_timeout_ms: u64,

    /// Capacity of each authority's request channel
    #[serde(default = "default_request_buffer")]
    pub request_buffer: usize,

    /// Number of independent authorities, keys are routed by hash
    #[serde(default = "default_shards")]
    pub shards: usize,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_handoff_timeout() -> u64 {
    25
}
fn default_request_buffer() -> usize {
    1024
}
fn default_shards() -> usize {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handoff_timeout_ms: default_handoff_timeout(),
            request_buffer: default_request_buffer(),
            shards: default_shards(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then `KEYLOCK_*` environment
    /// variables on top. Missing values fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }
        let config: Config = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.handoff_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "handoff_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.request_buffer == 0 {
            return Err(Error::InvalidConfig(
                "request_buffer must be greater than 0".into(),
            ));
        }
        if self.shards == 0 {
            return Err(Error::InvalidConfig("shards must be at least 1".into()));
        }
        Ok(())
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.handoff_timeout(), Duration::from_millis(25));
        assert_eq!(config.shards, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "handoff_timeout_ms = 50\nshards = 4").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.handoff_timeout_ms, 50);
        assert_eq!(config.shards, 4);
        assert_eq!(config.request_buffer, 1024);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_rejects_zero_shards() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "shards = 0").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = Config {
            handoff_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
