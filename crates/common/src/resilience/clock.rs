//! Trait for time operations to enable deterministic testing.
//!
//! Production code uses [`SystemClock`]; tests drive a [`MockClock`] so
//! window arithmetic can be exercised without real delays.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// Current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock implementation for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now_utc(&self) -> DateTime<Utc> {
        (**self).now_utc()
    }
}

/// Mock clock for deterministic testing.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock pinned to the given instant.
    pub fn at(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Create a mock clock starting at the current system time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Advance the clock without any real delay.
    pub fn advance(&self, duration: Duration) {
        match self.now.lock() {
            Ok(mut now) => *now = *now + duration,
            Err(poisoned) => {
                warn!("mock clock lock poisoned");
                let mut now = poisoned.into_inner();
                *now = *now + duration;
            }
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    /// Pin the clock to a specific instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        match self.now.lock() {
            Ok(mut now) => *now = instant,
            Err(poisoned) => {
                warn!("mock clock lock poisoned");
                *poisoned.into_inner() = instant;
            }
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => {
                warn!("mock clock lock poisoned");
                *poisoned.into_inner()
            }
        }
    }
}
