//! # radar-core
//!
//! Core logic for the radar exposure-notification client.
//!
//! This crate provides:
//! - Exposure state reconciliation: raw tracing status in, a stable,
//!   de-duplicated and persisted [`ExposureInfo`] out, with user
//!   notifications only on genuine transitions
//! - A replaying exposure stream for late subscribers
//! - Decoy ("fake") request scheduling with exponentially distributed gaps
//! - Persistent storage and configuration
//!
//! ## Architecture
//!
//! - [`exposure`] - exposure level domain model
//! - [`status`] - raw tracing SDK snapshot and its mapping to the domain
//! - [`reconciler`] - the reconciliation engine
//! - [`subject`] - broadcast stream replaying its latest value
//! - [`fake_requests`] - exponential distribution and decoy scheduler
//! - [`ports`] - traits for the external collaborators
//! - [`storage`] - JSON file persistence
//! - [`clock`] - system clock
//! - [`config`] - layered configuration loading, saving, and validation
//! - [`error`] - error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod exposure;
pub mod fake_requests;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod ports;
pub mod reconciler;
pub mod status;
pub mod storage;
pub mod subject;

// Re-export primary types for convenience
pub use clock::SystemClock;
pub use crate::config::{ExposureConfig, FakeRequestConfig, HostConfig, RadarConfig};
pub use error::{
    ConfigError, DistributionError, LocalizationError, RadarError, RefreshError, Result,
    StatusError, StorageError,
};
pub use exposure::{ExposureInfo, ExposureLevel, TracingInactiveError};
pub use fake_requests::{ExponentialDistribution, FakeRequestScheduler, NEXT_FAKE_REQUEST_KEY};
pub use ports::{
    Clock, ExposureStore, LocalizationLoader, NotificationDispatcher, TimestampStore,
    TracingStatusSource,
};
pub use reconciler::{ExposureReconciler, NotificationPolicy, Reconciliation};
pub use status::{
    ExposureDay, ExposureNotificationCode, InfectionStatus, SdkError, TrackingState,
    TracingStatus,
};
pub use storage::{default_data_dir, JsonFileStore};
pub use subject::{ExposureItem, ExposureSubject, ExposureSubscription};
