//! Wall-clock time sources.
//!
//! Aggregation needs wall-clock timestamps, expressed as fractional seconds since the UNIX epoch: they are written
//! into the outgoing Graphite lines, and the decaying sample and distinct counter compare them against fixed windows.
//! Everything that reads the time does so through [`Clock`] so tests can drive it by hand with [`MockClock`].
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time as seconds since the UNIX epoch.
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }
}

/// A manually-driven clock.
///
/// Clones share the same underlying time, so a test can hand one clone to the code under test and keep another to
/// move time forward.
#[derive(Clone, Default)]
pub struct MockClock {
    secs: Arc<AtomicU64>,
}

impl MockClock {
    /// Creates a new `MockClock` reading `secs`.
    pub fn new(secs: f64) -> Self {
        Self { secs: Arc::new(AtomicU64::new(secs.to_bits())) }
    }

    /// Sets the current time.
    pub fn set(&self, secs: f64) {
        self.secs.store(secs.to_bits(), Ordering::Release);
    }

    /// Moves the current time forward by `secs`.
    pub fn advance(&self, secs: f64) {
        let _ = self.secs.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |current| {
            Some((f64::from_bits(current) + secs).to_bits())
        });
    }
}

impl Clock for MockClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.secs.load(Ordering::Acquire))
    }
}

impl fmt::Debug for MockClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockClock").field("secs", &self.now()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, MockClock, SystemClock};

    #[test]
    fn mock_clock_is_shared_between_clones() {
        let clock = MockClock::new(42.0);
        let handle = clock.clone();
        assert_eq!(clock.now(), 42.0);

        handle.advance(1.5);
        assert_eq!(clock.now(), 43.5);

        handle.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        // 2001-09-09, well before any machine running this.
        assert!(SystemClock.now() > 1_000_000_000.0);
    }
}
