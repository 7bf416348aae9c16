//! Test doubles for the ports.
//!
//! Available in test builds and with the `mocks` feature:
//!
//! ```toml
//! [dev-dependencies]
//! radar-core = { version = "*", features = ["mocks"] }
//! ```
//!
//! All doubles are cheap to clone and clones share state, so a test can keep
//! a handle while the reconciler or scheduler owns another.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{LocalizationError, StatusError, StorageError};
use crate::exposure::ExposureInfo;
use crate::ports::{
    Clock, ExposureStore, LocalizationLoader, NotificationDispatcher, TimestampStore,
    TracingStatusSource,
};
use crate::status::TracingStatus;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(operation: &str) -> std::io::Error {
    std::io::Error::other(format!("injected {operation} failure"))
}

/// Controllable clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock starting at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        *lock(&self.current_time) += delta;
    }

    /// Set the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *lock(&self.current_time) = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.current_time)
    }
}

#[derive(Debug, Default)]
struct ExposureSlot {
    value: Option<ExposureInfo>,
    writes: Vec<ExposureInfo>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory [`ExposureStore`] that records every write.
#[derive(Debug, Clone, Default)]
pub struct MemoryExposureStore {
    inner: Arc<Mutex<ExposureSlot>>,
}

impl MemoryExposureStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `info`.
    #[must_use]
    pub fn with_value(info: ExposureInfo) -> Self {
        let store = Self::new();
        lock(&store.inner).value = Some(info);
        store
    }

    /// Current persisted value.
    #[must_use]
    pub fn value(&self) -> Option<ExposureInfo> {
        lock(&self.inner).value.clone()
    }

    /// Every successful write, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<ExposureInfo> {
        lock(&self.inner).writes.clone()
    }

    /// Make subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.inner).fail_reads = fail;
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }
}

impl ExposureStore for MemoryExposureStore {
    fn read(&self) -> Result<Option<ExposureInfo>, StorageError> {
        let slot = lock(&self.inner);
        if slot.fail_reads {
            return Err(StorageError::Read {
                path: "memory://exposure".into(),
                source: injected("read"),
            });
        }
        Ok(slot.value.clone())
    }

    fn write(&self, info: &ExposureInfo) -> Result<(), StorageError> {
        let mut slot = lock(&self.inner);
        if slot.fail_writes {
            return Err(StorageError::Write {
                path: "memory://exposure".into(),
                source: injected("write"),
            });
        }
        slot.value = Some(info.clone());
        slot.writes.push(info.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TimestampSlots {
    values: HashMap<String, DateTime<Utc>>,
    write_count: usize,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory [`TimestampStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTimestampStore {
    inner: Arc<Mutex<TimestampSlots>>,
}

impl MemoryTimestampStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`, bypassing failure injection.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<DateTime<Utc>> {
        lock(&self.inner).values.get(key).copied()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        lock(&self.inner).write_count
    }

    /// Make subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.inner).fail_reads = fail;
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }
}

impl TimestampStore for MemoryTimestampStore {
    fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let slots = lock(&self.inner);
        if slots.fail_reads {
            return Err(StorageError::Read {
                path: format!("memory://{key}").into(),
                source: injected("read"),
            });
        }
        Ok(slots.values.get(key).copied())
    }

    fn write_timestamp(&self, key: &str, value: DateTime<Utc>) -> Result<(), StorageError> {
        let mut slots = lock(&self.inner);
        if slots.fail_writes {
            return Err(StorageError::Write {
                path: format!("memory://{key}").into(),
                source: injected("write"),
            });
        }
        slots.values.insert(key.to_owned(), value);
        slots.write_count += 1;
        Ok(())
    }
}

/// [`NotificationDispatcher`] that records scheduled alerts.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    scheduled: Arc<Mutex<Vec<ExposureInfo>>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts scheduled so far.
    #[must_use]
    pub fn scheduled(&self) -> Vec<ExposureInfo> {
        lock(&self.scheduled).clone()
    }

    /// Number of alerts scheduled so far.
    #[must_use]
    pub fn count(&self) -> usize {
        lock(&self.scheduled).len()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn schedule(&self, info: &ExposureInfo) {
        lock(&self.scheduled).push(info.clone());
    }
}

/// [`TracingStatusSource`] answering from a queue of canned results.
///
/// Once the queue is empty it keeps answering with the last result.
#[derive(Debug, Clone)]
pub struct ScriptedStatusSource {
    script: Arc<Mutex<VecDeque<Result<TracingStatus, StatusError>>>>,
    last: Arc<Mutex<Result<TracingStatus, StatusError>>>,
}

impl ScriptedStatusSource {
    /// Source that always answers `status`.
    #[must_use]
    pub fn always(status: TracingStatus) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            last: Arc::new(Mutex::new(Ok(status))),
        }
    }

    /// Source that always fails with `error`.
    #[must_use]
    pub fn failing(error: StatusError) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            last: Arc::new(Mutex::new(Err(error))),
        }
    }

    /// Queue a result to be returned before falling back to the last one.
    pub fn push(&self, result: Result<TracingStatus, StatusError>) {
        lock(&self.script).push_back(result);
    }
}

#[async_trait]
impl TracingStatusSource for ScriptedStatusSource {
    async fn current_status(&self) -> Result<TracingStatus, StatusError> {
        let next = lock(&self.script).pop_front();
        match next {
            Some(result) => {
                lock(&self.last).clone_from(&result);
                result
            }
            None => lock(&self.last).clone(),
        }
    }
}

/// How [`StubLocalization`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalizationBehavior {
    /// Loads immediately.
    Ready,
    /// Fails immediately.
    Fail,
    /// Loads after the given delay.
    Delay(Duration),
}

/// [`LocalizationLoader`] with scripted behavior.
#[derive(Debug, Clone)]
pub struct StubLocalization {
    behavior: Arc<Mutex<LocalizationBehavior>>,
}

impl StubLocalization {
    /// Loader with the given behavior.
    #[must_use]
    pub fn new(behavior: LocalizationBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
        }
    }

    /// Loader that succeeds immediately.
    #[must_use]
    pub fn ready() -> Self {
        Self::new(LocalizationBehavior::Ready)
    }

    /// Change the behavior for subsequent loads.
    pub fn set(&self, behavior: LocalizationBehavior) {
        *lock(&self.behavior) = behavior;
    }
}

#[async_trait]
impl LocalizationLoader for StubLocalization {
    async fn load(&self) -> Result<(), LocalizationError> {
        let behavior = *lock(&self.behavior);
        match behavior {
            LocalizationBehavior::Ready => Ok(()),
            LocalizationBehavior::Fail => Err(LocalizationError::Empty),
            LocalizationBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}
