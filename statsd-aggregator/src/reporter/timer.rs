use std::sync::Arc;

use statsd_util::{parse_quantiles, Clock, Histogram, Quantile};

use super::{join_path, round6, sort_by_path, Datapoint};

const QUANTILES: &[f64] = &[0.5, 0.75, 0.95, 0.98, 0.99, 0.999];

/// How a timer's sample of durations evolves across flushes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReservoirPolicy {
    /// Durations are uniformly sampled and the sample is cleared on every flush.
    ///
    /// Each flush describes exactly the interval that just ended. As long as no more than 1028 durations arrive
    /// within an interval, the percentiles are computed over every one of them.
    #[default]
    ResetOnFlush,

    /// Durations are sampled with an exponentially decaying reservoir that is never cleared.
    ///
    /// Percentiles and the other distribution statistics are smoothed over roughly the last five minutes instead of
    /// jumping from one interval to the next. Count and rate still describe the interval that just ended.
    Continuous,
}

/// A timer, reporting the distribution of durations and their throughput.
pub struct TimerReporter {
    path: String,
    policy: ReservoirPolicy,
    histogram: Histogram,
    quantiles: Vec<Quantile>,
    count: u64,
    recorded: u64,
    last_flush: f64,
}

impl TimerReporter {
    /// Creates a new `TimerReporter` reporting under `path`.
    pub fn new(path: String, policy: ReservoirPolicy, clock: Arc<dyn Clock>) -> Self {
        let last_flush = clock.now();
        let histogram = match policy {
            ReservoirPolicy::ResetOnFlush => Histogram::uniform(),
            ReservoirPolicy::Continuous => Histogram::exponentially_decaying(clock),
        };

        TimerReporter { path, policy, histogram, quantiles: parse_quantiles(QUANTILES), count: 0, recorded: 0, last_flush }
    }

    /// Records a duration, in milliseconds.
    ///
    /// Negative durations are counted, but are otherwise ignored.
    pub fn update(&mut self, duration: f64) {
        self.count += 1;
        if duration >= 0.0 {
            self.recorded += 1;
            self.histogram.update(duration);
        }
    }

    /// Gets the number of durations recorded since the last flush.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Gets the underlying histogram.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Returns `true` if there is nothing to report.
    ///
    /// Only a timer that is reset on flush can be idle: a continuous timer always has its smoothed distribution to
    /// report.
    pub fn is_idle(&self) -> bool {
        self.policy == ReservoirPolicy::ResetOnFlush && self.count == 0
    }

    /// Flushes the timer.
    ///
    /// `percent` selects the additional `upper_<percent>` percentile. All values are rounded to six decimal places,
    /// and datapoints are sorted by path. The rate only covers durations that made it into the histogram, so negative
    /// durations show up in `count` but not in `rate`.
    pub fn flush(&mut self, percent: u8, timestamp: u64) -> Vec<Datapoint> {
        let now = timestamp as f64;
        let elapsed = now - self.last_flush;
        let rate = if elapsed > 0.0 { self.recorded as f64 / elapsed } else { 0.0 };

        let mut percentiles = Vec::with_capacity(self.quantiles.len() + 1);
        percentiles.push(f64::from(percent) / 100.0);
        percentiles.extend(self.quantiles.iter().map(Quantile::value));
        let scores = self.histogram.percentiles(&percentiles);

        let mut items = vec![
            ("count".to_string(), self.count as f64),
            ("max".to_string(), self.histogram.max()),
            ("mean".to_string(), self.histogram.mean()),
            ("min".to_string(), self.histogram.min()),
            ("rate".to_string(), rate),
            ("stddev".to_string(), self.histogram.std_dev()),
            (format!("upper_{}", percent), scores[0]),
        ];
        for (quantile, score) in self.quantiles.iter().zip(&scores[1..]) {
            items.push((quantile.label().to_string(), *score));
        }

        let mut datapoints = items
            .into_iter()
            .map(|(suffix, value)| Datapoint::new(join_path(&self.path, &suffix), round6(value), timestamp))
            .collect::<Vec<_>>();
        sort_by_path(&mut datapoints);

        self.count = 0;
        self.recorded = 0;
        self.last_flush = now;
        if self.policy == ReservoirPolicy::ResetOnFlush {
            self.histogram.clear();
        }

        datapoints
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use statsd_util::MockClock;

    use super::{ReservoirPolicy, TimerReporter};
    use crate::reporter::Datapoint;

    fn timer(policy: ReservoirPolicy, clock: &MockClock) -> TimerReporter {
        TimerReporter::new("stats.timers.glork".to_string(), policy, Arc::new(clock.clone()))
    }

    fn value_of(datapoints: &[Datapoint], suffix: &str) -> f64 {
        let path = format!("stats.timers.glork.{}", suffix);
        datapoints.iter().find(|d| d.path == path).map(|d| d.value).unwrap()
    }

    #[test]
    fn flush_layout() {
        let clock = MockClock::new(1000.0);
        let mut timer = timer(ReservoirPolicy::ResetOnFlush, &clock);
        for duration in [4.0, 8.0, 15.0, 16.0, 23.0, 42.0] {
            timer.update(duration);
        }

        let datapoints = timer.flush(90, 1010);
        let paths = datapoints.iter().map(|d| d.path.as_str()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                "stats.timers.glork.75percentile",
                "stats.timers.glork.95percentile",
                "stats.timers.glork.98percentile",
                "stats.timers.glork.999percentile",
                "stats.timers.glork.99percentile",
                "stats.timers.glork.count",
                "stats.timers.glork.max",
                "stats.timers.glork.mean",
                "stats.timers.glork.median",
                "stats.timers.glork.min",
                "stats.timers.glork.rate",
                "stats.timers.glork.stddev",
                "stats.timers.glork.upper_90",
            ]
        );
        assert!(datapoints.iter().all(|d| d.timestamp == 1010));

        assert_eq!(value_of(&datapoints, "count"), 6.0);
        assert_eq!(value_of(&datapoints, "min"), 4.0);
        assert_eq!(value_of(&datapoints, "max"), 42.0);
        assert_eq!(value_of(&datapoints, "mean"), 18.0);
        assert_eq!(value_of(&datapoints, "median"), 15.5);
        assert_eq!(value_of(&datapoints, "75percentile"), 27.75);
        assert_eq!(value_of(&datapoints, "95percentile"), 42.0);
        assert_eq!(value_of(&datapoints, "upper_90"), 42.0);
        assert_eq!(value_of(&datapoints, "rate"), 0.6);
        assert_abs_diff_eq!(value_of(&datapoints, "stddev"), 13.490738, epsilon = 1e-9);
    }

    #[test]
    fn upper_percent() {
        let clock = MockClock::new(1000.0);
        let mut timer = timer(ReservoirPolicy::ResetOnFlush, &clock);
        for duration in [4.0, 8.0, 15.0, 16.0, 23.0, 42.0] {
            timer.update(duration);
        }

        // 0.5 * 7 = 3.5, halfway between 15 and 16.
        let datapoints = timer.flush(50, 1010);
        assert_eq!(value_of(&datapoints, "upper_50"), 15.5);
    }

    #[test]
    fn reset_on_flush() {
        let clock = MockClock::new(1000.0);
        let mut timer = timer(ReservoirPolicy::ResetOnFlush, &clock);
        assert!(timer.is_idle());

        timer.update(320.0);
        assert!(!timer.is_idle());
        timer.flush(90, 1010);

        assert!(timer.is_idle());
        assert_eq!(timer.count(), 0);
        assert_eq!(timer.histogram().count(), 0);
    }

    #[test]
    fn continuous() {
        let clock = MockClock::new(1000.0);
        let mut timer = timer(ReservoirPolicy::Continuous, &clock);
        assert!(!timer.is_idle());

        timer.update(10.0);
        timer.update(30.0);
        let first = timer.flush(90, 1010);
        assert_eq!(value_of(&first, "count"), 2.0);
        assert_eq!(value_of(&first, "mean"), 20.0);

        // The distribution carries over, the throughput doesn't.
        let second = timer.flush(90, 1020);
        assert_eq!(value_of(&second, "count"), 0.0);
        assert_eq!(value_of(&second, "rate"), 0.0);
        assert_eq!(value_of(&second, "mean"), 20.0);
        assert_eq!(value_of(&second, "max"), 30.0);
        assert_eq!(timer.histogram().count(), 2);
    }

    #[test]
    fn negative_durations() {
        let clock = MockClock::new(1000.0);
        let mut timer = timer(ReservoirPolicy::ResetOnFlush, &clock);
        timer.update(-5.0);
        timer.update(10.0);

        let datapoints = timer.flush(90, 1010);
        assert_eq!(value_of(&datapoints, "count"), 2.0);
        assert_eq!(value_of(&datapoints, "min"), 10.0);
        assert_eq!(value_of(&datapoints, "mean"), 10.0);
        assert_eq!(value_of(&datapoints, "rate"), 0.1);
    }

    #[test]
    fn rate_without_elapsed_time() {
        let clock = MockClock::new(1000.0);
        let mut timer = timer(ReservoirPolicy::ResetOnFlush, &clock);
        timer.update(1.0);

        let datapoints = timer.flush(90, 1000);
        assert_eq!(value_of(&datapoints, "rate"), 0.0);
    }
}
