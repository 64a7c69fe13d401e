//! Session time sources

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use concentric_core::Timestamp;

/// Supplies the current session time to the decay tick
pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock anchored at creation
#[derive(Debug, Clone)]
pub struct MonotonicTimeSource {
    origin: Instant,
    offset: Timestamp,
}

impl MonotonicTimeSource {
    /// Session time starts at zero now
    pub fn new() -> Self {
        Self::starting_at(Timestamp::ZERO)
    }

    /// Session time starts at `offset` now
    pub fn starting_at(offset: Timestamp) -> Self {
        Self {
            origin: Instant::now(),
            offset,
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now(&self) -> Timestamp {
        self.offset.saturating_add(self.origin.elapsed())
    }
}

/// Time that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<AtomicI64>,
}

impl ManualTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start.as_micros())),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now.store(at.as_micros(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let micros = i64::try_from(by.as_micros()).unwrap_or(i64::MAX);
        self.now.fetch_add(micros, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.now.load(Ordering::SeqCst))
    }
}
