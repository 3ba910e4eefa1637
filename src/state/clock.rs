//! Local clocks and server clock reconciliation.
//!
//! The server stamps every snapshot with its own wall-clock time. The
//! reconciler keeps `server - local` as a single offset (last write wins) so
//! the rest of the client can ask for "now" in server terms.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of local wall-clock time.
///
/// Injected everywhere time matters so reconnect and keep-alive timers can be
/// driven deterministically in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at_millis(millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::at_millis(instant.timestamp_millis())
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(duration_millis(by), Ordering::SeqCst);
    }

    pub fn millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_millis(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        from_millis(self.millis())
    }
}

pub(crate) fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Instant at `millis` since the epoch, clamped to chrono's range.
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(instant) => instant,
        None if millis > 0 => DateTime::<Utc>::MAX_UTC,
        None => DateTime::<Utc>::MIN_UTC,
    }
}

/// `instant + d`, saturating at the representable range.
pub(crate) fn after(instant: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    from_millis(instant.timestamp_millis().saturating_add(duration_millis(d)))
}

/// Tracks the server/local clock offset.
///
/// `current_time` never goes backwards for a given reconciler even when a
/// later snapshot pulls the offset down; it holds at the previous high-water
/// mark until the new estimate catches up.
#[derive(Debug)]
pub struct ClockReconciler {
    offset_ms: AtomicI64,
    high_water_ms: AtomicI64,
}

impl ClockReconciler {
    pub fn new() -> Self {
        Self {
            offset_ms: AtomicI64::new(0),
            high_water_ms: AtomicI64::new(i64::MIN),
        }
    }

    /// Record a server timestamp observed at local time `received_at`.
    pub fn observe(&self, server_time: DateTime<Utc>, received_at: DateTime<Utc>) -> i64 {
        let offset = server_time
            .timestamp_millis()
            .saturating_sub(received_at.timestamp_millis());
        self.offset_ms.store(offset, Ordering::SeqCst);
        offset
    }

    /// Current offset in milliseconds (`server - local`).
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    /// Unclamped estimate of the server's clock at local time `local_now`.
    pub fn estimate(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        from_millis(local_now.timestamp_millis().saturating_add(self.offset_ms()))
    }

    /// Best current estimate of server time, non-decreasing across calls.
    pub fn current_time(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        let estimate = self.estimate(local_now).timestamp_millis();
        let previous = self.high_water_ms.fetch_max(estimate, Ordering::SeqCst);
        from_millis(previous.max(estimate))
    }
}

impl Default for ClockReconciler {
    fn default() -> Self {
        Self::new()
    }
}
