//! Boundaries to the collaborators the core depends on.
//!
//! The tracing SDK, notification presentation, localization and durable
//! storage all live outside this crate. Hosts implement these traits;
//! [`crate::storage`] and [`crate::clock`] provide the stock adapters and the
//! `mocks` module provides test doubles.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{LocalizationError, StatusError, StorageError};
use crate::exposure::ExposureInfo;
use crate::status::TracingStatus;

/// Wall-clock source.
///
/// Monotonic enough for interval math; not required to survive clock
/// adjustments.
pub trait Clock: Send + Sync + Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// On-demand access to the tracing SDK status.
#[async_trait]
pub trait TracingStatusSource: Send + Sync {
    /// Fetches the current status snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`StatusError`] when the SDK cannot produce a status.
    async fn current_status(&self) -> Result<TracingStatus, StatusError>;
}

/// Durable slot holding the last trustworthy [`ExposureInfo`].
pub trait ExposureStore: Send + Sync {
    /// Reads the persisted record, `None` if nothing was written yet.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the record exists but cannot be read.
    fn read(&self) -> Result<Option<ExposureInfo>, StorageError>;

    /// Overwrites the persisted record.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the record cannot be written.
    fn write(&self, info: &ExposureInfo) -> Result<(), StorageError>;
}

/// Presents user-visible exposure alerts. Fire-and-forget.
pub trait NotificationDispatcher: Send + Sync {
    /// Schedules an alert describing `info`.
    fn schedule(&self, info: &ExposureInfo);
}

/// Loads the localized strings notification content depends on.
#[async_trait]
pub trait LocalizationLoader: Send + Sync {
    /// Completes once localized content is available.
    ///
    /// # Errors
    ///
    /// Returns a [`LocalizationError`] if the content cannot be loaded.
    async fn load(&self) -> Result<(), LocalizationError>;
}

/// Key-value slot for single timestamps.
pub trait TimestampStore: Send + Sync {
    /// Reads the timestamp stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store cannot be read.
    fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store cannot be written.
    fn write_timestamp(&self, key: &str, value: DateTime<Utc>) -> Result<(), StorageError>;
}
