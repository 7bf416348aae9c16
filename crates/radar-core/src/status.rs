//! Raw tracing status as reported by the proximity-tracing SDK.
//!
//! These types mirror the SDK boundary and are serializable so a host can feed
//! snapshots from files or IPC. [`map_status`] turns a snapshot into the
//! [`ExposureInfo`] domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exposure::{ExposureInfo, ExposureLevel, TracingInactiveError};

/// Snapshot of the tracing subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingStatus {
    /// Radio / permission health.
    pub tracking: TrackingState,

    /// Infection determination.
    pub infection: InfectionStatus,

    /// When the SDK last synced exposure data.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl TracingStatus {
    /// An active snapshot with the given infection status.
    #[must_use]
    pub const fn active(infection: InfectionStatus, last_sync: Option<DateTime<Utc>>) -> Self {
        Self {
            tracking: TrackingState::Active,
            infection,
            last_sync,
        }
    }

    /// An inactive snapshot. The infection status is irrelevant for mapping.
    #[must_use]
    pub const fn inactive(error: SdkError) -> Self {
        Self {
            tracking: TrackingState::Inactive(error),
            infection: InfectionStatus::Healthy,
            last_sync: None,
        }
    }
}

/// Whether tracing is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum TrackingState {
    /// Tracing is running.
    Active,
    /// Tracing was stopped by the user.
    Stopped,
    /// Tracing cannot run.
    Inactive(SdkError),
}

/// Error reported by the SDK when tracking is inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SdkError {
    /// Bluetooth radio is off.
    BluetoothTurnedOff,
    /// The SDK lacks a required permission.
    PermissionError,
    /// The OS exposure-notification framework failed.
    ExposureNotification(ExposureNotificationCode),
    /// Any other SDK failure.
    Other(String),
}

/// Error codes of the OS exposure-notification framework that matter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureNotificationCode {
    /// The user did not authorize exposure notifications.
    NotAuthorized,
    /// Exposure notifications are disabled system-wide.
    NotEnabled,
    /// Restricted by policy (e.g. parental controls).
    Restricted,
    /// Any other framework code.
    Other(i32),
}

/// Infection determination from the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InfectionStatus {
    /// No matching exposures.
    Healthy,
    /// The user reported a positive diagnosis.
    Infected,
    /// Matching exposures on the given days.
    Exposed {
        /// Days with exposure, in SDK order (not guaranteed chronological).
        days: Vec<ExposureDay>,
    },
}

/// A single day with a detected exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureDay {
    /// Day the contact happened.
    pub exposed_date: DateTime<Utc>,
    /// When the SDK detected the match.
    pub reported_at: DateTime<Utc>,
}

impl SdkError {
    /// Maps an SDK error onto the domain error shown to the user.
    #[must_use]
    pub const fn to_domain(&self) -> TracingInactiveError {
        match self {
            Self::BluetoothTurnedOff => TracingInactiveError::BluetoothOff,
            Self::PermissionError
            | Self::ExposureNotification(ExposureNotificationCode::NotAuthorized) => {
                TracingInactiveError::NotAuthorized
            }
            Self::ExposureNotification(_) | Self::Other(_) => TracingInactiveError::Unknown,
        }
    }
}

/// Earliest exposure date in `days`, independent of their order.
#[must_use]
pub fn earliest_exposure(days: &[ExposureDay]) -> Option<DateTime<Utc>> {
    days.iter().map(|day| day.exposed_date).min()
}

/// Maps a raw snapshot onto an [`ExposureInfo`].
///
/// `previous` is the last persisted record; an inactive snapshot keeps its
/// level and `since` and attaches the mapped error. Infected records come
/// back without `since`, the reconciler stamps it.
#[must_use]
pub fn map_status(status: &TracingStatus, previous: Option<&ExposureInfo>) -> ExposureInfo {
    if let TrackingState::Inactive(error) = &status.tracking {
        let mut info = previous.map_or_else(ExposureInfo::healthy, |prev| {
            let mut carried = ExposureInfo::new(prev.level);
            carried.since = prev.since;
            carried
        });
        info.error = Some(error.to_domain());
        return info;
    }

    match &status.infection {
        InfectionStatus::Healthy => {
            let mut info = ExposureInfo::new(ExposureLevel::Healthy);
            info.last_check = status.last_sync;
            info
        }
        InfectionStatus::Infected => ExposureInfo::new(ExposureLevel::Infected),
        InfectionStatus::Exposed { days } => {
            let mut info = ExposureInfo::new(ExposureLevel::Exposed);
            info.since = earliest_exposure(days);
            info.last_check = status.last_sync;
            info
        }
    }
}
