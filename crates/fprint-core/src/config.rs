//! Verification configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::{ANY_FINGER, DEFAULT_DEVICE_PATH, FPRINT_SERVICE};
use crate::error::ConfigError;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "FPRINT_VERIFY_CONFIG";

/// Default number of scans before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Which message bus to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    System,
    Session,
}

/// Verification configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Bus the fingerprint service lives on
    pub bus: BusKind,

    /// Well-known service name
    pub service: String,

    /// Object path of the scanner
    pub device_path: String,

    /// User to claim the device for (empty means the calling user)
    pub username: String,

    /// Enrolled finger to match against
    pub finger: String,

    /// Non-matching scans allowed before failing
    pub max_attempts: u32,

    /// Give up waiting for a scan after this many seconds
    pub event_timeout_secs: Option<u64>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::System,
            service: FPRINT_SERVICE.to_string(),
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            username: String::new(),
            finger: ANY_FINGER.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            event_timeout_secs: None,
        }
    }
}

impl VerifyConfig {
    /// Config file location: `$FPRINT_VERIFY_CONFIG`, else the user config dir
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("/etc"))
                    .join("fprint-verify")
                    .join("config.json")
            })
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.finger.is_empty() {
            return Err(ConfigError::Invalid("finger must not be empty".to_string()));
        }
        if !self.device_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "device_path must be an absolute object path, got {:?}",
                self.device_path
            )));
        }
        if self.service.is_empty() {
            return Err(ConfigError::Invalid("service must not be empty".to_string()));
        }
        if self.event_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "event_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Bounded wait for the next event, if configured
    pub fn event_timeout(&self) -> Option<Duration> {
        self.event_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VerifyConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.finger, "any");
        assert_eq!(config.device_path, "/net/reactivated/Fprint/Device/0");
        assert_eq!(config.bus, BusKind::System);
        assert!(config.event_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = VerifyConfig {
            username: "alice".to_string(),
            max_attempts: 5,
            event_timeout_secs: Some(30),
            bus: BusKind::Session,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = VerifyConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.event_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_attempts": 1, "bus": "session" }"#).unwrap();

        let loaded = VerifyConfig::load(&path).unwrap();
        assert_eq!(loaded.max_attempts, 1);
        assert_eq!(loaded.bus, BusKind::Session);
        assert_eq!(loaded.finger, "any");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = VerifyConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, VerifyConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = VerifyConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));

        let relative = VerifyConfig {
            device_path: "Device/0".to_string(),
            ..Default::default()
        };
        assert!(relative.validate().is_err());

        let no_finger = VerifyConfig {
            finger: String::new(),
            ..Default::default()
        };
        assert!(no_finger.validate().is_err());

        let zero_timeout = VerifyConfig {
            event_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(VerifyConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
