use super::Datapoint;

/// A counter, reported both as a per-second rate and as a raw count.
///
/// Sampled updates are scaled up by the inverse of their sample rate, so a client sending one in every ten events
/// with `@0.1` still produces the right total. The accumulator has no floor: negative updates are applied as-is.
#[derive(Debug)]
pub struct CounterReporter {
    rate_path: String,
    count_path: String,
    value: f64,
}

impl CounterReporter {
    /// Creates a new `CounterReporter` reporting its rate under `rate_path` and its count under `count_path`.
    pub fn new(rate_path: String, count_path: String) -> Self {
        CounterReporter { rate_path, count_path, value: 0.0 }
    }

    /// Adds `value`, sent at the given sample rate.
    pub fn update(&mut self, value: f64, sample_rate: f64) {
        self.value += value * (1.0 / sample_rate);
    }

    /// Gets the value accumulated since the last flush.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Flushes the counter, resetting it to zero.
    ///
    /// The rate is the accumulated value divided by `interval_secs`, or zero if the interval is empty.
    pub fn flush(&mut self, interval_secs: f64, timestamp: u64) -> [Datapoint; 2] {
        let count = std::mem::replace(&mut self.value, 0.0);
        let rate = if interval_secs > 0.0 { count / interval_secs } else { 0.0 };

        [
            Datapoint::new(self.rate_path.clone(), rate, timestamp),
            Datapoint::new(self.count_path.clone(), count, timestamp),
        ]
    }
}
