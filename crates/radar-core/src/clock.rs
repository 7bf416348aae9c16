//! Clock adapters.
//!
//! `MockClock` lives in [`crate::mocks`] (enabled in tests and with the
//! `mocks` feature).

use chrono::{DateTime, Utc};

use crate::ports::Clock;

/// System clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
