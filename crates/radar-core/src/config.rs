//! Application configuration management.
//!
//! Configuration is layered with the `config` crate: an optional TOML file,
//! overridden by `RADAR_`-prefixed environment variables using `__` to reach
//! nested keys (e.g. `RADAR_FAKE_REQUESTS__RATE=2.0`). Every field has a
//! default, so an empty or missing file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config as Layered, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StorageError};
use crate::fake_requests::{
    ExponentialDistribution, DEFAULT_RATE, DEFAULT_TIME_UNIT, MAX_TIME_UNIT,
};
use crate::reconciler::{NotificationPolicy, DEFAULT_LOCALIZATION_TIMEOUT};
use crate::storage::default_data_dir;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RADAR";

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RadarConfig {
    /// Directory for persisted state. Platform default when unset.
    pub data_dir: Option<PathBuf>,

    /// Exposure reconciliation settings.
    pub exposure: ExposureConfig,

    /// Decoy request settings.
    pub fake_requests: FakeRequestConfig,

    /// Locations of host-provided inputs.
    pub host: HostConfig,
}

/// Exposure reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Notify on the first transition into `Infected` as well.
    pub notify_on_infected: bool,

    /// Seconds to wait for localized content before dropping an alert.
    pub localization_timeout_secs: u64,

    /// Seconds between explicit status polls.
    pub status_poll_interval_secs: u64,

    /// Seconds between checks of the status file for changes.
    pub status_watch_interval_secs: u64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            notify_on_infected: false,
            localization_timeout_secs: DEFAULT_LOCALIZATION_TIMEOUT.as_secs(),
            status_poll_interval_secs: 15 * 60,
            status_watch_interval_secs: 5,
        }
    }
}

impl ExposureConfig {
    /// Notification policy for the reconciler.
    #[must_use]
    pub const fn notification_policy(&self) -> NotificationPolicy {
        NotificationPolicy {
            notify_on_infected: self.notify_on_infected,
            localization_timeout: Duration::from_secs(self.localization_timeout_secs),
        }
    }

    /// Interval between explicit status polls.
    #[must_use]
    pub const fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    /// Interval between status file change checks.
    #[must_use]
    pub const fn status_watch_interval(&self) -> Duration {
        Duration::from_secs(self.status_watch_interval_secs)
    }
}

/// Decoy request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeRequestConfig {
    /// Whether decoy requests are scheduled at all.
    pub enabled: bool,

    /// Rate of the exponential distribution, per time unit.
    pub rate: f64,

    /// Length of one time unit in seconds.
    pub time_unit_secs: u64,
}

impl Default for FakeRequestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: DEFAULT_RATE,
            time_unit_secs: DEFAULT_TIME_UNIT.as_secs(),
        }
    }
}

impl FakeRequestConfig {
    /// Distribution for the configured rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is not finite and positive.
    pub fn distribution(&self) -> Result<ExponentialDistribution, ConfigError> {
        ExponentialDistribution::new(self.rate).map_err(|err| ConfigError::ValidationError {
            field: "fake_requests.rate".into(),
            message: err.to_string(),
        })
    }

    /// Length of one time unit.
    #[must_use]
    pub const fn time_unit(&self) -> Duration {
        Duration::from_secs(self.time_unit_secs)
    }
}

/// Locations of host-provided inputs. Relative to the data directory when
/// unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// JSON tracing status snapshot written by the SDK bridge.
    pub status_file: Option<PathBuf>,

    /// JSON string table used for notification content.
    pub localization_file: Option<PathBuf>,
}

impl RadarConfig {
    /// Load configuration from `path` (if given) or the default location,
    /// then apply environment overrides and validate.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (file, required) = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                (path.to_path_buf(), true)
            }
            None => (Self::config_path(), false),
        };

        let config: Self = Layered::builder()
            .add_source(File::from(file).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = Layered::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check all values, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns a single [`ConfigError::ValidationError`] or
    /// [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Err(err) = self.fake_requests.distribution() {
            errors.push(err);
        }
        for (field, value) in [
            ("fake_requests.time_unit_secs", self.fake_requests.time_unit_secs),
            (
                "exposure.localization_timeout_secs",
                self.exposure.localization_timeout_secs,
            ),
            (
                "exposure.status_poll_interval_secs",
                self.exposure.status_poll_interval_secs,
            ),
            (
                "exposure.status_watch_interval_secs",
                self.exposure.status_watch_interval_secs,
            ),
        ] {
            if value == 0 {
                errors.push(ConfigError::ValidationError {
                    field: field.into(),
                    message: "must be greater than zero".into(),
                });
            }
        }

        if self.fake_requests.time_unit_secs > MAX_TIME_UNIT.as_secs() {
            errors.push(ConfigError::ValidationError {
                field: "fake_requests.time_unit_secs".into(),
                message: format!("must be at most {}", MAX_TIME_UNIT.as_secs()),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Resolved data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if unset and no platform default exists.
    pub fn data_dir(&self) -> Result<PathBuf, StorageError> {
        self.data_dir
            .as_ref()
            .map_or_else(default_data_dir, |dir| Ok(dir.clone()))
    }

    /// Resolved tracing status snapshot path.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be resolved.
    pub fn status_file(&self) -> Result<PathBuf, StorageError> {
        match &self.host.status_file {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("tracing_status.json")),
        }
    }

    /// Resolved localization bundle path.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be resolved.
    pub fn localization_file(&self) -> Result<PathBuf, StorageError> {
        match &self.host.localization_file {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("localization.json")),
        }
    }

    /// Default configuration file path.
    ///
    /// On Linux: `/etc/radar/config.toml`. Elsewhere: the per-user config
    /// directory, falling back to `./radar.toml`.
    #[must_use]
    pub fn config_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/radar/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "radar").map_or_else(
                || PathBuf::from("radar.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RadarConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.fake_requests.enabled);
        assert!((config.fake_requests.rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.fake_requests.time_unit(), Duration::from_secs(86_400));
        assert!(!config.exposure.notify_on_infected);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RadarConfig::from_toml_str(
            r#"
            [exposure]
            notify_on_infected = true

            [fake_requests]
            rate = 2.5
            "#,
        )
        .unwrap();

        assert!(config.exposure.notify_on_infected);
        assert_eq!(config.exposure.status_poll_interval_secs, 900);
        assert!((config.fake_requests.rate - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.fake_requests.time_unit_secs, 86_400);
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        let err = RadarConfig::from_toml_str("[fake_requests]\nrate = 0.0\n").unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "fake_requests.rate"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_multiple_violations_are_collected() {
        let mut config = RadarConfig::default();
        config.fake_requests.rate = -1.0;
        config.fake_requests.time_unit_secs = 0;
        config.exposure.localization_timeout_secs = 0;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_time_unit_is_bounded() {
        let mut config = RadarConfig::default();
        config.fake_requests.time_unit_secs = MAX_TIME_UNIT.as_secs();
        assert!(config.validate().is_ok());

        config.fake_requests.time_unit_secs = 100_000_000_000;
        match config.validate() {
            Err(ConfigError::ValidationError { field, message }) => {
                assert_eq!(field, "fake_requests.time_unit_secs");
                assert!(message.contains("at most"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let mut config = RadarConfig::default();
        config.data_dir = Some(dir.path().join("data"));
        config.exposure.notify_on_infected = true;
        config.fake_requests.time_unit_secs = 3600;
        config.save(&path).unwrap();

        let loaded = RadarConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_explicit_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            RadarConfig::load(Some(&path)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_host_paths_default_under_data_dir() {
        let config = RadarConfig {
            data_dir: Some(PathBuf::from("/tmp/radar-test")),
            ..RadarConfig::default()
        };
        assert_eq!(
            config.status_file().unwrap(),
            PathBuf::from("/tmp/radar-test/tracing_status.json")
        );
        assert_eq!(
            config.localization_file().unwrap(),
            PathBuf::from("/tmp/radar-test/localization.json")
        );
    }

    #[test]
    fn test_notification_policy_from_config() {
        let exposure = ExposureConfig {
            notify_on_infected: true,
            localization_timeout_secs: 3,
            status_poll_interval_secs: 60,
            status_watch_interval_secs: 2,
        };
        let policy = exposure.notification_policy();
        assert!(policy.notify_on_infected);
        assert_eq!(policy.localization_timeout, Duration::from_secs(3));
        assert_eq!(exposure.status_poll_interval(), Duration::from_secs(60));
        assert_eq!(exposure.status_watch_interval(), Duration::from_secs(2));
    }
}
