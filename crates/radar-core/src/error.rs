//! Error types for the radar core library.
//!
//! Each concern has its own error enum ([`StorageError`], [`StatusError`],
//! [`LocalizationError`], [`ConfigError`], [`DistributionError`]) and the
//! unified [`RadarError`] wraps them for callers that only need one type.
//!
//! # Design Principles
//!
//! - **Absorb at the boundary**: the reconciler converts recoverable failures
//!   into domain values or log lines; only [`RefreshError`] reaches stream
//!   subscribers.
//! - **Actionable messages**: error messages say what to check.
//! - **Context preservation**: wrapped errors keep their source.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure to read or write persisted state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading a store file failed.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a store file failed.
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A store file exists but does not contain valid JSON.
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        /// File that could not be parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized.
    #[error("Failed to serialize stored value: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The data directory could not be created.
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No platform data directory could be determined.
    #[error("Cannot determine data directory for this platform")]
    DataDirUnavailable,
}

/// Failure to obtain a tracing status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    /// The status source could not be reached.
    #[error("Tracing status unavailable: {0}")]
    Unavailable(String),

    /// The status source answered with something that is not a status.
    #[error("Malformed tracing status: {0}")]
    Malformed(String),

    /// The tracing SDK reported a failure while computing the status.
    #[error("Tracing SDK error: {0}")]
    Sdk(String),
}

/// Explicit status poll failed.
///
/// Delivered once to the caller of
/// [`ExposureReconciler::refresh`](crate::reconciler::ExposureReconciler::refresh)
/// and to the subscribers present at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tracing status refresh failed at {at}: {source}")]
pub struct RefreshError {
    /// When the poll was attempted.
    pub at: DateTime<Utc>,
    /// Why it failed.
    #[source]
    pub source: StatusError,
}

/// Failure to load localized notification content.
#[derive(Debug, Error)]
pub enum LocalizationError {
    /// No localization bundle at the expected location.
    #[error("Localization bundle not found at: {}", .0.display())]
    NotFound(PathBuf),

    /// The bundle exists but could not be read.
    #[error("Failed to read localization bundle {}: {source}", .path.display())]
    Read {
        /// Bundle path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bundle is not a valid string table.
    #[error("Failed to parse localization bundle: {0}")]
    Parse(String),

    /// The bundle parsed but holds no strings.
    #[error("Localization bundle is empty")]
    Empty,
}

/// Failure to load, save or validate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The explicitly requested config file does not exist.
    #[error("Configuration file not found at: {}", .0.display())]
    NotFound(PathBuf),

    /// Layered loading (file + environment) failed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path, e.g. `fake_requests.rate`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("Configuration has {} invalid values", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Invalid parameter for a random distribution.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum DistributionError {
    /// The rate must be finite and strictly positive.
    #[error("Exponential rate must be finite and > 0 (got {0})")]
    InvalidRate(f64),
}

/// The unified error type for radar operations.
#[derive(Debug, Error)]
pub enum RadarError {
    /// Persisted state could not be accessed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The tracing status source failed.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// An explicit refresh failed.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// Notification content could not be loaded.
    #[error(transparent)]
    Localization(#[from] LocalizationError),

    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A distribution parameter is invalid.
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

/// A specialized [`Result`] type for radar operations.
pub type Result<T> = std::result::Result<T, RadarError>;

impl RadarError {
    /// Returns `true` if this error is related to persistence.
    #[inline]
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Distribution(_))
    }

    /// Returns `true` if retrying later may succeed without user action.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Status(StatusError::Unavailable(_))
                | Self::Refresh(_)
                | Self::Localization(_)
        )
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Storage(StorageError::Read { .. }) => "STORAGE_READ_FAILED",
            Self::Storage(StorageError::Write { .. }) => "STORAGE_WRITE_FAILED",
            Self::Storage(StorageError::Parse { .. }) => "STORAGE_PARSE_FAILED",
            Self::Storage(StorageError::Serialize(_)) => "STORAGE_SERIALIZE_FAILED",
            Self::Storage(StorageError::CreateDir { .. }) => "STORAGE_CREATE_DIR_FAILED",
            Self::Storage(StorageError::DataDirUnavailable) => "DATA_DIR_UNAVAILABLE",
            Self::Status(StatusError::Unavailable(_)) => "STATUS_UNAVAILABLE",
            Self::Status(StatusError::Malformed(_)) => "STATUS_MALFORMED",
            Self::Status(StatusError::Sdk(_)) => "STATUS_SDK_ERROR",
            Self::Refresh(_) => "REFRESH_FAILED",
            Self::Localization(_) => "LOCALIZATION_UNAVAILABLE",
            Self::Config(ConfigError::NotFound(_)) => "CONFIG_NOT_FOUND",
            Self::Config(ConfigError::Load(_) | ConfigError::Serialize(_)) => "CONFIG_PARSE_ERROR",
            Self::Config(ConfigError::Write { .. }) => "CONFIG_WRITE_FAILED",
            Self::Config(
                ConfigError::ValidationError { .. } | ConfigError::MultipleValidationErrors(_),
            ) => "CONFIG_VALIDATION_ERROR",
            Self::Distribution(_) => "INVALID_DISTRIBUTION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_storage_error_classification() {
        let err: RadarError = StorageError::Read {
            path: PathBuf::from("/data/exposure_info.json"),
            source: IoErr::new(ErrorKind::PermissionDenied, "denied"),
        }
        .into();

        assert!(err.is_storage_error());
        assert!(!err.is_config_error());
        assert_eq!(err.error_code(), "STORAGE_READ_FAILED");
    }

    #[test]
    fn test_status_errors_are_recoverable() {
        let err: RadarError = StatusError::Unavailable("sdk not started".into()).into();
        assert!(!err.is_storage_error());
        assert!(err.is_recoverable());

        let err: RadarError = StatusError::Malformed("bad json".into()).into();
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "STATUS_MALFORMED");
    }

    #[test]
    fn test_refresh_error_message_includes_source() {
        let err = RefreshError {
            at: DateTime::<Utc>::UNIX_EPOCH,
            source: StatusError::Sdk("timeout".into()),
        };
        let message = err.to_string();
        assert!(message.contains("refresh failed"));
        assert!(message.contains("timeout"));
    }

    #[test]
    fn test_config_error_classification() {
        let err: RadarError = ConfigError::ValidationError {
            field: "fake_requests.rate".into(),
            message: "must be > 0".into(),
        }
        .into();
        assert!(err.is_config_error());
        assert_eq!(err.error_code(), "CONFIG_VALIDATION_ERROR");
        assert!(err.to_string().contains("fake_requests.rate"));

        let err: RadarError = DistributionError::InvalidRate(0.0).into();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_multiple_validation_errors_message() {
        let err = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "a".into(),
                message: "bad".into(),
            },
            ConfigError::ValidationError {
                field: "b".into(),
                message: "bad".into(),
            },
        ]);
        assert_eq!(err.to_string(), "Configuration has 2 invalid values");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RadarError>();
        assert_sync::<RadarError>();
    }
}
