//! Wall-clock abstraction for run timestamps.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};

/// Source of wall-clock time for manifests.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that advances by a fixed step on every read.
///
/// Gives stable run ids and strictly increasing step timestamps in tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
    step: TimeDelta,
}

impl MockClock {
    /// Creates a clock starting at `start` that advances 1ms per read.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
            step: TimeDelta::milliseconds(1),
        }
    }

    /// Sets how far the clock advances on every read.
    pub fn with_step(mut self, step: TimeDelta) -> Self {
        self.step = step;
        self
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let now = *current;
        *current = now + self.step;
        now
    }
}
