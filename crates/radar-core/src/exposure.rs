//! Exposure level domain model.
//!
//! [`ExposureInfo`] is the stable, user-facing view of the tracing state. It is
//! rebuilt from every raw [`TracingStatus`](crate::status::TracingStatus) and
//! persisted only when it carries no [`TracingInactiveError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification derived from proximity-tracing data.
///
/// The variants are distinct states; `Infected` is not "more" than `Exposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureLevel {
    /// No exposure detected.
    Healthy,
    /// Contact with a reported case was detected.
    Exposed,
    /// The user reported a positive diagnosis.
    Infected,
}

impl ExposureLevel {
    /// Stable lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Exposed => "exposed",
            Self::Infected => "infected",
        }
    }
}

impl std::fmt::Display for ExposureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason why the tracing subsystem is not running.
///
/// Carried as a value on [`ExposureInfo::error`]; never raised as a stream
/// failure and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingInactiveError {
    /// The Bluetooth radio is switched off.
    #[error("Bluetooth is turned off. Enable Bluetooth to resume exposure tracing.")]
    BluetoothOff,

    /// Exposure notification permission was denied or revoked.
    #[error("Exposure notifications are not authorized. Grant permission in system settings.")]
    NotAuthorized,

    /// Tracing stopped for a reason the app cannot act on.
    #[error("Exposure tracing is inactive for an unknown reason")]
    Unknown,
}

/// Canonical exposure state shown to the user and persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureInfo {
    /// Current level.
    pub level: ExposureLevel,

    /// When the current level began. Only set on a transition into
    /// `Exposed` or `Infected`.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,

    /// Last time the tracing status was synced. Absent for `Infected`.
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,

    /// Set when tracing is inactive. Records carrying an error are transient.
    #[serde(skip)]
    pub error: Option<TracingInactiveError>,
}

impl ExposureInfo {
    /// A record at `level` with no timestamps and no error.
    #[must_use]
    pub const fn new(level: ExposureLevel) -> Self {
        Self {
            level,
            since: None,
            last_check: None,
            error: None,
        }
    }

    /// The default record used when nothing has been persisted yet.
    #[must_use]
    pub const fn healthy() -> Self {
        Self::new(ExposureLevel::Healthy)
    }

    /// Equality used for notification decisions: `level` and `since` only.
    ///
    /// `last_check` changes on every sync and `error` is transient, so both
    /// are ignored.
    #[must_use]
    pub fn same_exposure(&self, other: &Self) -> bool {
        self.level == other.level && self.since == other.since
    }

    /// Whether this record may be written to the store.
    #[must_use]
    pub const fn is_persistable(&self) -> bool {
        self.error.is_none()
    }
}

impl Default for ExposureInfo {
    fn default() -> Self {
        Self::healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 9, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_same_exposure_ignores_last_check_and_error() {
        let mut a = ExposureInfo::new(ExposureLevel::Exposed);
        a.since = Some(at(1));
        a.last_check = Some(at(2));

        let mut b = a.clone();
        b.last_check = Some(at(5));
        b.error = Some(TracingInactiveError::BluetoothOff);

        assert!(a.same_exposure(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_exposure_compares_level_and_since() {
        let mut exposed = ExposureInfo::new(ExposureLevel::Exposed);
        exposed.since = Some(at(1));

        let mut later = exposed.clone();
        later.since = Some(at(3));
        assert!(!exposed.same_exposure(&later));

        let mut infected = ExposureInfo::new(ExposureLevel::Infected);
        infected.since = Some(at(1));
        assert!(!exposed.same_exposure(&infected));
    }

    #[test]
    fn test_default_is_healthy_without_timestamps() {
        let info = ExposureInfo::default();
        assert_eq!(info.level, ExposureLevel::Healthy);
        assert!(info.since.is_none());
        assert!(info.last_check.is_none());
        assert!(info.is_persistable());
    }

    #[test]
    fn test_error_is_not_serialized() {
        let mut info = ExposureInfo::new(ExposureLevel::Exposed);
        info.since = Some(at(4));
        info.error = Some(TracingInactiveError::NotAuthorized);

        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("error"));
        assert!(json.contains("\"exposed\""));

        let back: ExposureInfo = serde_json::from_str(&json).unwrap();
        assert!(back.error.is_none());
        assert!(back.same_exposure(&info));
    }

    #[test]
    fn test_level_display() {
        assert_eq!(ExposureLevel::Infected.to_string(), "infected");
    }
}
