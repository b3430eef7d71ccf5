use std::sync::Arc;

use statsd_util::{Clock, Ewma};

use super::{join_path, round6, Datapoint};

/// A meter, measuring the rate at which events occur.
///
/// Alongside the cumulative count and the mean rate since creation, a meter keeps one, five and fifteen minute
/// moving averages, in the style of the UNIX load average. Those averages only move when [`tick`](Self::tick) is
/// called, which must happen every five seconds regardless of how often the meter is flushed.
pub struct MeterReporter {
    path: String,
    count: f64,
    m1_rate: Ewma,
    m5_rate: Ewma,
    m15_rate: Ewma,
    start_time: f64,
    clock: Arc<dyn Clock>,
}

impl MeterReporter {
    /// Creates a new `MeterReporter` reporting under `path`.
    pub fn new(path: String, clock: Arc<dyn Clock>) -> Self {
        MeterReporter {
            path,
            count: 0.0,
            m1_rate: Ewma::one_minute(),
            m5_rate: Ewma::five_minute(),
            m15_rate: Ewma::fifteen_minute(),
            start_time: clock.now(),
            clock,
        }
    }

    /// Marks the occurrence of `n` events.
    pub fn mark(&mut self, n: f64) {
        self.count += n;
        self.m1_rate.update(n);
        self.m5_rate.update(n);
        self.m15_rate.update(n);
    }

    /// Folds the events marked since the last tick into the moving averages.
    pub fn tick(&mut self) {
        self.m1_rate.tick();
        self.m5_rate.tick();
        self.m15_rate.tick();
    }

    /// Gets the number of events marked since creation.
    pub fn count(&self) -> f64 {
        self.count
    }

    /// Gets the one minute moving average rate, in events per second.
    pub fn one_minute_rate(&self) -> f64 {
        self.m1_rate.rate()
    }

    /// Gets the five minute moving average rate, in events per second.
    pub fn five_minute_rate(&self) -> f64 {
        self.m5_rate.rate()
    }

    /// Gets the fifteen minute moving average rate, in events per second.
    pub fn fifteen_minute_rate(&self) -> f64 {
        self.m15_rate.rate()
    }

    /// Gets the mean rate since creation, in events per second.
    pub fn mean_rate(&self) -> f64 {
        let elapsed = self.clock.now() - self.start_time;
        if elapsed > 0.0 {
            self.count / elapsed
        } else {
            0.0
        }
    }

    /// Flushes the meter.
    ///
    /// Nothing is reset: a meter reports its state since creation.
    pub fn flush(&self, timestamp: u64) -> Vec<Datapoint> {
        [
            ("15min_rate", self.fifteen_minute_rate()),
            ("1min_rate", self.one_minute_rate()),
            ("5min_rate", self.five_minute_rate()),
            ("count", self.count),
            ("mean_rate", self.mean_rate()),
        ]
        .into_iter()
        .map(|(suffix, value)| Datapoint::new(join_path(&self.path, suffix), round6(value), timestamp))
        .collect()
    }
}
