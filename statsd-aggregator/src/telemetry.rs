use std::time::Duration;

use hashbrown::HashMap;

/// A group of reporters flushed together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushKind {
    /// Counters.
    Counter,

    /// Timers.
    Timer,

    /// Gauges.
    Gauge,

    /// Meters.
    Meter,

    /// Plugin-provided metrics.
    Plugin,
}

impl FlushKind {
    /// Every kind, in flush order.
    pub const ALL: [FlushKind; 5] =
        [FlushKind::Counter, FlushKind::Timer, FlushKind::Gauge, FlushKind::Meter, FlushKind::Plugin];

    /// Gets the name of the kind, as used in internal metric paths.
    pub const fn as_str(self) -> &'static str {
        match self {
            FlushKind::Counter => "counter",
            FlushKind::Timer => "timer",
            FlushKind::Gauge => "gauge",
            FlushKind::Meter => "meter",
            FlushKind::Plugin => "plugin",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Number of metrics flushed, and time spent flushing them, per [`FlushKind`].
#[derive(Debug, Default)]
pub struct FlushStats {
    counts: [u64; 5],
    durations: [Duration; 5],
}

impl FlushStats {
    /// Records the flush of `count` metrics of the given kind.
    pub fn record(&mut self, kind: FlushKind, count: usize, elapsed: Duration) {
        self.counts[kind.index()] += count as u64;
        self.durations[kind.index()] += elapsed;
    }

    /// Gets the number of metrics flushed of the given kind.
    pub fn count(&self, kind: FlushKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Gets the time spent flushing metrics of the given kind.
    pub fn duration(&self, kind: FlushKind) -> Duration {
        self.durations[kind.index()]
    }

    /// Gets the number of metrics flushed across every kind.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Number of messages processed, and time spent processing them, per metric type tag.
#[derive(Debug, Default)]
pub struct ReceiveStats {
    by_tag: HashMap<String, (u64, Duration)>,
}

impl ReceiveStats {
    /// Records the processing of a message with the given type tag.
    pub fn record(&mut self, tag: &str, elapsed: Duration) {
        let (count, duration) = self.by_tag.entry_ref(tag).or_default();
        *count += 1;
        *duration += elapsed;
    }

    /// Clears all recorded stats.
    pub fn clear(&mut self) {
        self.by_tag.clear();
    }

    /// Returns `true` if any messages have been recorded.
    pub fn had_updates(&self) -> bool {
        !self.by_tag.is_empty()
    }

    /// Gets the number of messages and total processing time for a type tag.
    pub fn get(&self, tag: &str) -> Option<(u64, Duration)> {
        self.by_tag.get(tag).copied()
    }

    /// Gets the stats of every type tag, sorted by tag.
    pub fn sorted(&self) -> Vec<(&str, u64, Duration)> {
        let mut stats =
            self.by_tag.iter().map(|(tag, (count, duration))| (tag.as_str(), *count, *duration)).collect::<Vec<_>>();
        stats.sort_unstable_by(|a, b| a.0.cmp(b.0));
        stats
    }
}
