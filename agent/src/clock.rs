//! Wall-clock source for sync timestamps.
//!
//! Timers use tokio's time; this clock only provides the timestamps written
//! into records and the checkpoint.

use chrono::{DateTime, SubsecRound, Utc};
use sitesync_engine::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// The system clock, at the microsecond resolution the remote stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().trunc_subsecs(6)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_engine::checkpoint::parse_timestamp;

    #[test]
    fn manual_clock_is_shared() {
        let clock = ManualClock::new(parse_timestamp("2024-01-01T00:00:00Z").unwrap());
        let other = clock.clone();

        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(
            other.now(),
            parse_timestamp("2024-01-01T00:01:30Z").unwrap()
        );

        other.set(parse_timestamp("2024-06-01T12:00:00.250Z").unwrap());
        assert_eq!(
            clock.now(),
            parse_timestamp("2024-06-01T12:00:00.250Z").unwrap()
        );
    }
}
