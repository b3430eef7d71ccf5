use std::sync::Arc;

use statsd_util::{Clock, SlidingDistinctCounter};

use super::{join_path, Datapoint};
use crate::{
    message::ParseError,
    plugin::{MetricFactory, PluginMetric},
};

const DEFAULT_HASHES: usize = 32;
const DEFAULT_BUCKETS: usize = 32;

const ONE_MINUTE: f64 = 60.0;
const ONE_HOUR: f64 = 60.0 * 60.0;
const ONE_DAY: f64 = 60.0 * 60.0 * 24.0;

/// Estimates the number of distinct items seen over sliding windows of time.
///
/// Reports the all-time estimate as `count`, and the estimates over the last minute, hour and day as `count_1min`,
/// `count_1hour` and `count_1day`. Memory use is fixed no matter how many items are seen.
pub struct DistinctReporter {
    path: String,
    counter: SlidingDistinctCounter,
    clock: Arc<dyn Clock>,
}

impl DistinctReporter {
    /// Creates a new `DistinctReporter` reporting under `path`.
    pub fn new(path: String, clock: Arc<dyn Clock>) -> Self {
        DistinctReporter { path, counter: SlidingDistinctCounter::new(DEFAULT_HASHES, DEFAULT_BUCKETS), clock }
    }

    /// Records that `item` was just seen.
    pub fn update(&mut self, item: &[u8]) {
        self.counter.add(self.clock.now(), item);
    }

    /// Estimates the number of distinct items ever seen.
    pub fn count(&self) -> u64 {
        self.counter.distinct(0.0)
    }

    /// Estimates the number of distinct items seen within the last `window` seconds.
    pub fn count_within(&self, window: f64) -> u64 {
        self.counter.distinct(self.clock.now() - window)
    }
}

impl PluginMetric for DistinctReporter {
    fn process(&mut self, fields: &[&str]) -> Result<(), ParseError> {
        self.update(fields[0].as_bytes());
        Ok(())
    }

    fn flush(&mut self, _interval_secs: f64, timestamp: u64) -> Vec<Datapoint> {
        [
            ("count", self.count()),
            ("count_1day", self.count_within(ONE_DAY)),
            ("count_1hour", self.count_within(ONE_HOUR)),
            ("count_1min", self.count_within(ONE_MINUTE)),
        ]
        .into_iter()
        .map(|(suffix, value)| Datapoint::new(join_path(&self.path, suffix), value as f64, timestamp))
        .collect()
    }
}

/// Builds [`DistinctReporter`]s for the `pd` metric type.
#[derive(Debug, Default)]
pub struct DistinctMetricFactory;

impl MetricFactory for DistinctMetricFactory {
    fn name(&self) -> &str {
        "pdistinct"
    }

    fn metric_type(&self) -> &str {
        "pd"
    }

    fn build_metric(&self, prefix: &str, name: &str, clock: Arc<dyn Clock>) -> Box<dyn PluginMetric> {
        Box::new(DistinctReporter::new(join_path(prefix, name), clock))
    }
}
