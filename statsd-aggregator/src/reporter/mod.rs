//! Per-kind metric reporters.
//!
//! Every reporter accumulates updates for a single key (or, for gauges, every key) and turns them into
//! [`Datapoint`]s on flush.
mod counter;
pub use self::counter::CounterReporter;

mod distinct;
pub use self::distinct::{DistinctMetricFactory, DistinctReporter};

mod gauge;
pub use self::gauge::GaugeQueue;

mod meter;
pub use self::meter::MeterReporter;

mod sli;
pub use self::sli::{Condition, SliMetricFactory, SliReporter};

mod timer;
pub use self::timer::{ReservoirPolicy, TimerReporter};

/// A single flushed value, ready to be written to Graphite.
#[derive(Clone, Debug, PartialEq)]
pub struct Datapoint {
    /// Full metric path.
    pub path: String,

    /// Value.
    pub value: f64,

    /// Timestamp, in seconds since the UNIX epoch.
    pub timestamp: u64,
}

impl Datapoint {
    /// Creates a new `Datapoint`.
    pub fn new<P: Into<String>>(path: P, value: f64, timestamp: u64) -> Self {
        Datapoint { path: path.into(), value, timestamp }
    }
}

/// Joins a metric path prefix and a name with a `.`, skipping the separator for an empty prefix.
pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if prefix.ends_with('.') {
        format!("{}{}", prefix, name)
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Rounds `value` to six decimal places.
pub(crate) fn round6(value: f64) -> f64 {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// Sorts datapoints by path, keeping the relative order of datapoints that share a path.
pub(crate) fn sort_by_path(datapoints: &mut [Datapoint]) {
    datapoints.sort_by(|a, b| a.path.cmp(&b.path));
}
