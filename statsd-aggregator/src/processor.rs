use std::{sync::Arc, time::Duration};

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};
use statsd_util::Clock;
use tracing::{debug, trace};

use crate::{
    key::normalize_key,
    message::{parse_sample_rate, parse_single_value, parse_value, Message, MetricKind, ParseError},
    plugin::{PluginMetric, PluginRegistry},
    reporter::{
        join_path, round6, sort_by_path, CounterReporter, Datapoint, GaugeQueue, MeterReporter, ReservoirPolicy,
        TimerReporter,
    },
    telemetry::{FlushKind, FlushStats, ReceiveStats},
};

/// Metric path prefixes and per-kind behavior of a [`MessageProcessor`].
#[derive(Clone, Debug)]
pub(crate) struct ProcessorConfig {
    pub stats_prefix: String,
    pub count_prefix: String,
    pub internal_prefix: String,
    pub reservoir_policy: ReservoirPolicy,
}

/// The aggregation engine.
///
/// Owns the state of every metric, keyed by metric type and normalized key. Messages are fed in through
/// [`process`](Self::process), and the aggregated state is turned into datapoints through [`flush`](Self::flush).
///
/// Counters, timers, gauges and meters each live in their own namespace, so the same key can be used as both a counter
/// and a timer. Plugin metrics are namespaced by their type tag. State for a key is created on the first valid message
/// for it, and lives for as long as the processor does.
///
/// `MessageProcessor` is single-writer. Use [`SharedProcessor`] to feed it from several threads.
pub struct MessageProcessor {
    counters: HashMap<String, CounterReporter>,
    timers: HashMap<String, TimerReporter>,
    gauges: GaugeQueue,
    meters: HashMap<String, MeterReporter>,
    plugin_metrics: HashMap<String, HashMap<String, Box<dyn PluginMetric>>>,
    plugins: PluginRegistry,
    config: ProcessorConfig,
    timer_prefix: String,
    meter_prefix: String,
    clock: Arc<dyn Clock>,
    timing_clock: quanta::Clock,
    receive_stats: ReceiveStats,
    bad_lines: u64,
}

impl MessageProcessor {
    pub(crate) fn new(
        config: ProcessorConfig,
        plugins: PluginRegistry,
        clock: Arc<dyn Clock>,
        timing_clock: quanta::Clock,
    ) -> Self {
        MessageProcessor {
            counters: HashMap::new(),
            timers: HashMap::new(),
            gauges: GaugeQueue::new(join_path(&config.stats_prefix, "gauge")),
            meters: HashMap::new(),
            plugin_metrics: HashMap::new(),
            plugins,
            timer_prefix: join_path(&config.stats_prefix, "timers"),
            meter_prefix: join_path(&config.stats_prefix, "meter"),
            config,
            clock,
            timing_clock,
            receive_stats: ReceiveStats::default(),
            bad_lines: 0,
        }
    }

    /// Processes a single message.
    ///
    /// Malformed messages, and messages for a metric type that nothing handles, are discarded and counted as bad lines.
    /// A discarded message never changes the state of any metric.
    pub fn process(&mut self, message: &[u8]) {
        let start = self.timing_clock.now();
        match self.try_process(message) {
            Ok(tag) => {
                let elapsed = self.timing_clock.now().saturating_duration_since(start);
                self.receive_stats.record(tag, elapsed);
            }
            Err(e) => {
                self.bad_lines += 1;
                debug!(error = %e, line = %String::from_utf8_lossy(message), "Discarding bad line.");
            }
        }
    }

    /// Processes every newline-separated message in a packet.
    ///
    /// Blank lines are skipped.
    pub fn process_packet(&mut self, packet: &[u8]) {
        for line in packet.split(|b| *b == b'\n') {
            if !line.iter().all(u8::is_ascii_whitespace) {
                self.process(line);
            }
        }
    }

    fn try_process<'a>(&mut self, message: &'a [u8]) -> Result<&'a str, ParseError> {
        let line = std::str::from_utf8(message).map_err(|_| ParseError::InvalidUtf8)?;
        let message = Message::parse(line)?;
        let tag = message.fields()[1];

        match message.kind() {
            MetricKind::Counter => {
                let value = parse_value(message.value())?;
                let sample_rate = message.extra().map(parse_sample_rate).transpose()?.unwrap_or(1.0);

                self.counter_entry(message.into_key()).update(value, sample_rate);
            }
            MetricKind::Timer => {
                let value = parse_value(message.value())?;
                self.timer_entry(message.into_key()).update(value);
            }
            MetricKind::Gauge => {
                let value = parse_single_value(message.value())?;
                self.gauges.push(message.into_key(), value);
            }
            MetricKind::Meter => {
                let value = parse_single_value(message.value())?;

                let (prefix, clock) = (&self.meter_prefix, &self.clock);
                self.meters
                    .entry(message.into_key())
                    .or_insert_with_key(|key| MeterReporter::new(join_path(prefix, key), Arc::clone(clock)))
                    .mark(value);
            }
            MetricKind::Extension(metric_type) => {
                let existing =
                    self.plugin_metrics.get_mut(&metric_type).and_then(|metrics| metrics.get_mut(message.key()));
                if let Some(metric) = existing {
                    metric.process(message.fields())?;
                } else {
                    let factory = self
                        .plugins
                        .get(&metric_type)
                        .ok_or_else(|| ParseError::UnknownMetricType(metric_type.clone()))?;

                    let prefix = join_path(&self.config.stats_prefix, factory.name());
                    let mut metric = factory.build_metric(&prefix, message.key(), Arc::clone(&self.clock));
                    metric.process(message.fields())?;

                    self.plugin_metrics.entry(metric_type).or_default().insert(message.into_key(), metric);
                }
            }
        }

        Ok(tag)
    }

    fn counter_entry(&mut self, key: String) -> &mut CounterReporter {
        let (stats_prefix, count_prefix) = (&self.config.stats_prefix, &self.config.count_prefix);
        self.counters.entry(key).or_insert_with_key(|key| {
            CounterReporter::new(join_path(stats_prefix, key), join_path(count_prefix, key))
        })
    }

    fn timer_entry(&mut self, key: String) -> &mut TimerReporter {
        let (prefix, policy, clock) = (&self.timer_prefix, self.config.reservoir_policy, &self.clock);
        self.timers
            .entry(key)
            .or_insert_with_key(|key| TimerReporter::new(join_path(prefix, key), policy, Arc::clone(clock)))
    }

    /// Adds `value` to the counter for `key`, exactly as an unsampled `c` message would.
    ///
    /// The key is normalized first, so it may contain characters that are not allowed in a message. A key that
    /// normalizes to nothing, or a value that is not finite, is counted as a bad line.
    pub fn increment_counter(&mut self, key: &str, value: f64) {
        match direct_update_key(key, value) {
            Ok(key) => self.counter_entry(key).update(value, 1.0),
            Err(e) => self.discard_update(&e, key),
        }
    }

    /// Records a duration, in milliseconds, for the timer for `key`, exactly as an `ms` message would.
    ///
    /// The key is normalized first, so it may contain characters that are not allowed in a message. A key that
    /// normalizes to nothing, or a duration that is not finite, is counted as a bad line.
    pub fn record_timing(&mut self, key: &str, duration_ms: f64) {
        match direct_update_key(key, duration_ms) {
            Ok(key) => self.timer_entry(key).update(duration_ms),
            Err(e) => self.discard_update(&e, key),
        }
    }

    fn discard_update(&mut self, error: &ParseError, key: &str) {
        self.bad_lines += 1;
        debug!(error = %error, key, "Discarding update.");
    }

    /// Ticks every meter, folding recent events into their moving averages.
    ///
    /// Must be called every five seconds.
    pub fn tick_meters(&mut self) {
        for meter in self.meters.values_mut() {
            meter.tick();
        }
    }

    /// Flushes every metric, followed by the processor's own statistics.
    ///
    /// `interval` is the time since the previous flush, used to turn counters into rates, and `percent` selects the
    /// `upper_<percent>` percentile reported by timers. All datapoints share a timestamp: the current time, in whole
    /// seconds.
    ///
    /// Metrics are flushed by kind, in the order counters, timers, gauges, meters and plugin metrics, and sorted by
    /// path within each kind. The processor's own statistics come last, under the internal prefix:
    ///
    /// - `numStats`: the number of metrics flushed
    /// - `flush.<kind>.count` and `flush.<kind>.duration`: the number of metrics flushed, and the time it took in
    ///   milliseconds, for each kind
    /// - `receive.<type>.count` and `receive.<type>.duration`: the number of messages processed since the last flush,
    ///   and the time it took in milliseconds, for each metric type tag
    pub fn flush(&mut self, interval: Duration, percent: u8) -> Vec<Datapoint> {
        let timestamp = self.clock.now().floor() as u64;
        let interval_secs = interval.as_secs_f64();

        let mut datapoints = Vec::new();
        let mut flush_stats = FlushStats::default();
        for kind in FlushKind::ALL {
            let start = self.timing_clock.now();
            let (count, mut flushed) = match kind {
                FlushKind::Counter => self.flush_counters(interval_secs, timestamp),
                FlushKind::Timer => self.flush_timers(percent, timestamp),
                FlushKind::Gauge => (self.gauges.len(), self.gauges.flush(timestamp)),
                FlushKind::Meter => self.flush_meters(timestamp),
                FlushKind::Plugin => self.flush_plugins(interval_secs, timestamp),
            };
            sort_by_path(&mut flushed);

            let elapsed = self.timing_clock.now().saturating_duration_since(start);
            trace!(kind = kind.as_str(), count, datapoints = flushed.len(), ?elapsed, "Flushed metrics.");

            flush_stats.record(kind, count, elapsed);
            datapoints.append(&mut flushed);
        }

        self.flush_internal(&flush_stats, timestamp, &mut datapoints);
        self.receive_stats.clear();

        datapoints
    }

    fn flush_counters(&mut self, interval_secs: f64, timestamp: u64) -> (usize, Vec<Datapoint>) {
        let datapoints =
            self.counters.values_mut().flat_map(|counter| counter.flush(interval_secs, timestamp)).collect();
        (self.counters.len(), datapoints)
    }

    fn flush_timers(&mut self, percent: u8, timestamp: u64) -> (usize, Vec<Datapoint>) {
        let mut count = 0;
        let mut datapoints = Vec::new();
        for timer in self.timers.values_mut().filter(|timer| !timer.is_idle()) {
            count += 1;
            datapoints.extend(timer.flush(percent, timestamp));
        }
        (count, datapoints)
    }

    fn flush_meters(&mut self, timestamp: u64) -> (usize, Vec<Datapoint>) {
        let datapoints = self.meters.values().flat_map(|meter| meter.flush(timestamp)).collect();
        (self.meters.len(), datapoints)
    }

    fn flush_plugins(&mut self, interval_secs: f64, timestamp: u64) -> (usize, Vec<Datapoint>) {
        let mut count = 0;
        let mut datapoints = Vec::new();
        for metric in self.plugin_metrics.values_mut().flat_map(|metrics| metrics.values_mut()) {
            count += 1;
            datapoints.extend(metric.flush(interval_secs, timestamp));
        }
        (count, datapoints)
    }

    fn flush_internal(&self, flush_stats: &FlushStats, timestamp: u64, datapoints: &mut Vec<Datapoint>) {
        let prefix = &self.config.internal_prefix;
        datapoints.push(Datapoint::new(join_path(prefix, "numStats"), flush_stats.total() as f64, timestamp));

        for kind in FlushKind::ALL {
            let path = join_path(prefix, &format!("flush.{}", kind.as_str()));
            let count = flush_stats.count(kind) as f64;
            let duration = duration_ms(flush_stats.duration(kind));
            datapoints.push(Datapoint::new(format!("{}.count", path), count, timestamp));
            datapoints.push(Datapoint::new(format!("{}.duration", path), duration, timestamp));
        }

        for (tag, count, duration) in self.receive_stats.sorted() {
            let path = join_path(prefix, &format!("receive.{}", tag));
            datapoints.push(Datapoint::new(format!("{}.count", path), count as f64, timestamp));
            datapoints.push(Datapoint::new(format!("{}.duration", path), duration_ms(duration), timestamp));
        }
    }

    /// Gets the number of messages discarded since the processor was created.
    pub fn bad_lines(&self) -> u64 {
        self.bad_lines
    }

    /// Gets the sorted, deduplicated keys of every metric seen so far.
    ///
    /// Gauge keys are only known until the next flush.
    pub fn metric_names(&self) -> Vec<String> {
        let mut names = self
            .counters
            .keys()
            .chain(self.timers.keys())
            .chain(self.meters.keys())
            .chain(self.plugin_metrics.values().flat_map(|metrics| metrics.keys()))
            .map(String::as_str)
            .chain(self.gauges.keys())
            .map(str::to_string)
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Gets the counter for a key.
    pub fn counter(&self, key: &str) -> Option<&CounterReporter> {
        self.counters.get(key)
    }

    /// Gets the timer for a key.
    pub fn timer(&self, key: &str) -> Option<&TimerReporter> {
        self.timers.get(key)
    }

    /// Gets the meter for a key.
    pub fn meter(&self, key: &str) -> Option<&MeterReporter> {
        self.meters.get(key)
    }

    /// Gets the number of messages processed since the last flush, and the time spent processing them, for a metric
    /// type tag.
    pub fn received(&self, tag: &str) -> Option<(u64, Duration)> {
        self.receive_stats.get(tag)
    }

    /// Gets the registered plugins.
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Gets the clock used to measure processing durations.
    pub fn timing_clock(&self) -> &quanta::Clock {
        &self.timing_clock
    }
}

fn direct_update_key(key: &str, value: f64) -> Result<String, ParseError> {
    if !value.is_finite() {
        return Err(ParseError::InvalidValue(value.to_string()));
    }

    let key = normalize_key(key);
    if key.is_empty() {
        return Err(ParseError::EmptyKey);
    }
    Ok(key)
}

fn duration_ms(duration: Duration) -> f64 {
    round6(duration.as_secs_f64() * 1000.0)
}

/// A [`MessageProcessor`] that can be shared between threads.
///
/// Every operation takes the lock for its duration, so processing, ticking and flushing never interleave.
#[derive(Clone)]
pub struct SharedProcessor {
    inner: Arc<Mutex<MessageProcessor>>,
}

impl SharedProcessor {
    /// Creates a new `SharedProcessor`.
    pub fn new(processor: MessageProcessor) -> Self {
        SharedProcessor { inner: Arc::new(Mutex::new(processor)) }
    }

    /// Processes a single message.
    pub fn process(&self, message: &[u8]) {
        self.inner.lock().process(message);
    }

    /// Processes every newline-separated message in a packet.
    pub fn process_packet(&self, packet: &[u8]) {
        self.inner.lock().process_packet(packet);
    }

    /// Ticks every meter.
    pub fn tick_meters(&self) {
        self.inner.lock().tick_meters();
    }

    /// Flushes every metric.
    pub fn flush(&self, interval: Duration, percent: u8) -> Vec<Datapoint> {
        self.inner.lock().flush(interval, percent)
    }

    /// Gets the number of messages discarded since the processor was created.
    pub fn bad_lines(&self) -> u64 {
        self.inner.lock().bad_lines()
    }

    /// Locks the processor.
    pub fn lock(&self) -> MutexGuard<'_, MessageProcessor> {
        self.inner.lock()
    }
}

impl From<MessageProcessor> for SharedProcessor {
    fn from(processor: MessageProcessor) -> Self {
        SharedProcessor::new(processor)
    }
}
