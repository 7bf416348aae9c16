//! Decoy request scheduling.
//!
//! Decoy requests carry no information; they exist so that an observer of
//! network traffic cannot tell real uploads apart by timing. Gaps between
//! decoys are drawn from an exponential distribution, whose memorylessness
//! keeps the expected wait independent of how long the app has been waiting.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use tracing::{debug, warn};

use crate::error::DistributionError;
use crate::ports::{Clock, TimestampStore};

/// Preferences key holding the next decoy time.
pub const NEXT_FAKE_REQUEST_KEY: &str = "fake_requests.next_date";

/// Default rate: one decoy per time unit on average.
pub const DEFAULT_RATE: f64 = 1.0;

/// Default time unit: one day.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted time unit: one year.
pub const MAX_TIME_UNIT: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Exponential distribution sampled by inverse-CDF transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDistribution {
    rate: f64,
}

impl ExponentialDistribution {
    /// Distribution with the given rate (mean `1 / rate`).
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::InvalidRate`] unless `rate` is finite and
    /// strictly positive.
    pub fn new(rate: f64) -> Result<Self, DistributionError> {
        if rate.is_finite() && rate > 0.0 {
            Ok(Self { rate })
        } else {
            Err(DistributionError::InvalidRate(rate))
        }
    }

    /// Draws one value: `-ln(1 - u) / rate` with `u` uniform in `[0, 1)`.
    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        let u: f64 = rng.gen();
        -(1.0 - u).ln() / self.rate
    }
}

impl Default for ExponentialDistribution {
    fn default() -> Self {
        Self { rate: DEFAULT_RATE }
    }
}

#[derive(Debug)]
struct SchedulerState<R> {
    rng: R,
    // Used only when the store cannot be written.
    fallback: Option<DateTime<Utc>>,
}

/// Keeps the persisted time of the next decoy request.
///
/// All access to the slot goes through one mutex, so `next_fire_time` and
/// `reschedule_after_firing` never interleave.
pub struct FakeRequestScheduler<R: RngCore + CryptoRng = OsRng> {
    store: Arc<dyn TimestampStore>,
    clock: Arc<dyn Clock>,
    distribution: ExponentialDistribution,
    unit: Duration,
    state: Mutex<SchedulerState<R>>,
}

impl FakeRequestScheduler<OsRng> {
    /// Scheduler drawing from the OS random source.
    pub fn new(
        store: Arc<dyn TimestampStore>,
        clock: Arc<dyn Clock>,
        distribution: ExponentialDistribution,
        unit: Duration,
    ) -> Self {
        Self::with_rng(store, clock, distribution, unit, OsRng)
    }
}

impl<R: RngCore + CryptoRng> FakeRequestScheduler<R> {
    /// Scheduler drawing from `rng`.
    pub fn with_rng(
        store: Arc<dyn TimestampStore>,
        clock: Arc<dyn Clock>,
        distribution: ExponentialDistribution,
        unit: Duration,
        rng: R,
    ) -> Self {
        Self {
            store,
            clock,
            distribution,
            unit,
            state: Mutex::new(SchedulerState {
                rng,
                fallback: None,
            }),
        }
    }

    /// When the next decoy request should fire.
    ///
    /// Returns the persisted value, drawing and persisting one first if none
    /// exists.
    pub fn next_fire_time(&self) -> DateTime<Utc> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        // An unsaved draw is newer than anything the store still holds.
        if let Some(next) = state.fallback {
            return next;
        }
        match self.store.read_timestamp(NEXT_FAKE_REQUEST_KEY) {
            Ok(Some(next)) => return next,
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "Failed to read next decoy time, treating as absent");
            }
        }
        self.draw_and_store(&mut state)
    }

    /// Draws and persists a new fire time. Call after a decoy was sent.
    pub fn reschedule_after_firing(&self) -> DateTime<Utc> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.draw_and_store(&mut state)
    }

    fn draw_and_store(&self, state: &mut SchedulerState<R>) -> DateTime<Utc> {
        let now = self.clock.now();
        let gap = self.distribution.sample(&mut state.rng);
        let next = now
            .checked_add_signed(scale(gap, self.unit))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        match self.store.write_timestamp(NEXT_FAKE_REQUEST_KEY, next) {
            Ok(()) => {
                state.fallback = None;
                debug!(next_fire_time = %next, gap_units = gap, "Scheduled next decoy request");
            }
            Err(err) => {
                state.fallback = Some(next);
                warn!(
                    error = %err,
                    next_fire_time = %next,
                    "Failed to persist next decoy time, keeping it in memory"
                );
            }
        }
        next
    }
}

impl<R: RngCore + CryptoRng> std::fmt::Debug for FakeRequestScheduler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRequestScheduler")
            .field("distribution", &self.distribution)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

/// `gap` time units as a chrono duration, saturating at one hundred units of
/// at most [`MAX_TIME_UNIT`] each.
fn scale(gap: f64, unit: Duration) -> chrono::Duration {
    // -ln(1 - u) is below 40 for any f64 u < 1; the cap only guards small rates.
    let units = gap.clamp(0.0, 100.0);
    let unit = unit.min(MAX_TIME_UNIT);
    let std_gap = Duration::try_from_secs_f64(units * unit.as_secs_f64()).unwrap_or(unit);
    chrono::Duration::from_std(std_gap).unwrap_or_else(|_| chrono::Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MemoryTimestampStore, MockClock};
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 9, 1, 12, 0, 0).unwrap()
    }

    fn scheduler(
        store: &MemoryTimestampStore,
        clock: &MockClock,
    ) -> FakeRequestScheduler<StdRng> {
        FakeRequestScheduler::with_rng(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            ExponentialDistribution::default(),
            DEFAULT_TIME_UNIT,
            StdRng::seed_from_u64(0x5EED),
        )
    }

    #[test]
    fn test_rate_must_be_positive_and_finite() {
        assert!(ExponentialDistribution::new(1.0).is_ok());
        assert!(ExponentialDistribution::new(0.25).is_ok());
        assert_eq!(
            ExponentialDistribution::new(0.0),
            Err(DistributionError::InvalidRate(0.0))
        );
        assert!(ExponentialDistribution::new(-1.0).is_err());
        assert!(ExponentialDistribution::new(f64::NAN).is_err());
        assert!(ExponentialDistribution::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_sample_mean_and_bounds() {
        let distribution = ExponentialDistribution::default();
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 100_000;

        let mut sum = 0.0;
        for _ in 0..draws {
            let value = distribution.sample(&mut rng);
            assert!(value >= 0.0, "negative draw {value}");
            sum += value;
        }
        let mean = sum / f64::from(draws);
        assert!((mean - 1.0).abs() < 0.02, "mean {mean} outside tolerance");
    }

    #[test]
    fn test_sample_mean_follows_rate() {
        let distribution = ExponentialDistribution::new(4.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let draws = 100_000;

        let sum: f64 = (0..draws).map(|_| distribution.sample(&mut rng)).sum();
        let mean = sum / f64::from(draws);
        assert!((mean - 0.25).abs() < 0.25 * 0.02, "mean {mean} outside tolerance");
    }

    #[test]
    fn test_next_fire_time_is_stable_until_rescheduled() {
        let store = MemoryTimestampStore::new();
        let clock = MockClock::new(start());
        let scheduler = scheduler(&store, &clock);

        let first = scheduler.next_fire_time();
        assert!(first >= start());
        assert_eq!(store.value(NEXT_FAKE_REQUEST_KEY), Some(first));

        clock.advance(chrono::Duration::hours(3));
        assert_eq!(scheduler.next_fire_time(), first);
        assert_eq!(store.write_count(), 1);

        let second = scheduler.reschedule_after_firing();
        assert_ne!(second, first);
        assert!(second >= clock.now());
        assert_eq!(scheduler.next_fire_time(), second);
        assert_eq!(store.value(NEXT_FAKE_REQUEST_KEY), Some(second));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_persisted_value_survives_new_scheduler() {
        let store = MemoryTimestampStore::new();
        let clock = MockClock::new(start());

        let first = scheduler(&store, &clock).next_fire_time();
        let reopened = scheduler(&store, &clock);
        assert_eq!(reopened.next_fire_time(), first);
    }

    #[test]
    fn test_gap_is_scaled_by_unit() {
        let store = MemoryTimestampStore::new();
        let clock = MockClock::new(start());
        let scheduler = FakeRequestScheduler::with_rng(
            Arc::new(store),
            Arc::new(clock),
            ExponentialDistribution::default(),
            Duration::from_secs(1),
            StdRng::seed_from_u64(1),
        );

        // With a one-second unit every draw lands well within a minute.
        for _ in 0..100 {
            let next = scheduler.reschedule_after_firing();
            assert!(next - start() < chrono::Duration::minutes(1));
        }
    }

    #[test]
    fn test_unreadable_store_is_treated_as_absent() {
        let store = MemoryTimestampStore::new();
        let clock = MockClock::new(start());
        let scheduler = scheduler(&store, &clock);
        store.fail_reads(true);

        let next = scheduler.next_fire_time();
        assert!(next >= start());
        assert_eq!(store.value(NEXT_FAKE_REQUEST_KEY), Some(next));
    }

    #[test]
    fn test_unwritable_store_keeps_value_in_memory() {
        let store = MemoryTimestampStore::new();
        let clock = MockClock::new(start());
        let scheduler = scheduler(&store, &clock);
        store.fail_writes(true);

        let first = scheduler.next_fire_time();
        assert_eq!(scheduler.next_fire_time(), first);
        assert!(store.value(NEXT_FAKE_REQUEST_KEY).is_none());

        store.fail_writes(false);
        let second = scheduler.reschedule_after_firing();
        assert_eq!(store.value(NEXT_FAKE_REQUEST_KEY), Some(second));
        assert_eq!(scheduler.next_fire_time(), second);
    }

    #[test]
    fn test_unsaved_draw_wins_over_stale_persisted_value() {
        let store = MemoryTimestampStore::new();
        let clock = MockClock::new(start());
        let scheduler = scheduler(&store, &clock);

        let fired = scheduler.next_fire_time();
        clock.set(fired + chrono::Duration::minutes(1));
        store.fail_writes(true);

        let next = scheduler.reschedule_after_firing();
        assert!(next > fired);
        assert_eq!(store.value(NEXT_FAKE_REQUEST_KEY), Some(fired));
        assert_eq!(scheduler.next_fire_time(), next);
        assert_eq!(scheduler.next_fire_time(), next);

        // Once the store accepts writes again it is the source of truth.
        store.fail_writes(false);
        let persisted = scheduler.reschedule_after_firing();
        assert_eq!(store.value(NEXT_FAKE_REQUEST_KEY), Some(persisted));
        assert_eq!(scheduler.next_fire_time(), persisted);
    }

    #[test]
    fn test_huge_unit_saturates_instead_of_overflowing() {
        let store = MemoryTimestampStore::new();
        let clock = MockClock::new(start());
        let scheduler = FakeRequestScheduler::with_rng(
            Arc::new(store.clone()),
            Arc::new(clock),
            ExponentialDistribution::new(0.001).unwrap(),
            Duration::from_secs(100_000_000_000),
            StdRng::seed_from_u64(3),
        );

        let next = scheduler.next_fire_time();
        assert!(next > start());
        assert!(next - start() <= chrono::Duration::days(100 * 366));
        assert_eq!(store.value(NEXT_FAKE_REQUEST_KEY), Some(next));
    }

    #[test]
    fn test_scale_caps_extreme_gaps() {
        let unit = Duration::from_secs(10);
        assert_eq!(scale(0.0, unit), chrono::Duration::zero());
        assert_eq!(scale(1.5, unit), chrono::Duration::seconds(15));
        assert_eq!(scale(1e9, unit), chrono::Duration::seconds(1000));
        assert_eq!(
            scale(1.0, Duration::from_secs(u64::MAX)),
            chrono::Duration::from_std(MAX_TIME_UNIT).unwrap()
        );
    }
}
