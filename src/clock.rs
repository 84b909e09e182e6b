use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;

/// Millisecond wall clock shared by the debouncer, the AI coordinator and the
/// note store's timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        let now = OffsetDateTime::now_utc();
        (now.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// Hand-driven clock for tests and replay.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<i64>>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_ms)),
        }
    }

    pub fn advance(&self, delta_ms: i64) -> i64 {
        let mut now = self.now.lock();
        *now += delta_ms;
        *now
    }

    pub fn set(&self, value_ms: i64) {
        *self.now.lock() = value_ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let shared = clock.clone();
        clock.advance(250);
        assert_eq!(shared.now_ms(), 1_250);
        shared.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn system_clock_reports_milliseconds() {
        let now = SystemClock.now_ms();
        // 2020-01-01 in epoch millis
        assert!(now > 1_577_836_800_000);
    }
}
