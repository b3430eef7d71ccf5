use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use statsd_util::{Clock, SystemClock};
use thiserror::Error;

use crate::{
    plugin::{ConfigError, MetricFactory, PluginOptions, PluginRegistry},
    processor::{MessageProcessor, ProcessorConfig, SharedProcessor},
    reporter::{DistinctMetricFactory, ReservoirPolicy, SliMetricFactory},
    scheduler::{FlushSink, Scheduler},
    writer::{GraphiteWriter, SMALLEST_VALID_PAYLOAD},
};

const DEFAULT_STATS_PREFIX: &str = "stats";
const DEFAULT_COUNT_PREFIX: &str = "stats_counts";
const DEFAULT_INTERNAL_PREFIX: &str = "statsd";
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PERCENT: u8 = 90;
const DEFAULT_MAX_PAYLOAD_LEN: usize = 8192;

// Meters' moving averages are defined in terms of this interval, so it is not configurable.
const METER_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Errors that could occur while building a message processor.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A plugin could not be registered or configured.
    #[error("failed to set up plugins: {0}")]
    Plugin(#[from] ConfigError),

    /// The timer percentile threshold was out of range.
    #[error("percentile threshold must be between 1 and 100, got {0}")]
    InvalidPercent(u8),

    /// The flush interval was zero.
    #[error("flush interval must be greater than zero")]
    InvalidFlushInterval,

    /// The maximum payload length was too small to hold any line.
    #[error("maximum payload length must be {min} or greater, got {len}")]
    InvalidMaxPayloadLength {
        /// The configured length.
        len: usize,

        /// The smallest allowed length.
        min: usize,
    },

    /// Failed to spawn the background thread for the scheduler.
    #[error("failed to spawn background thread for scheduler")]
    Backend,
}

/// Builder for a [`MessageProcessor`].
pub struct ProcessorBuilder {
    stats_prefix: String,
    count_prefix: String,
    internal_prefix: String,
    reservoir_policy: ReservoirPolicy,
    clock: Arc<dyn Clock>,
    timing_clock: quanta::Clock,
    default_plugins: bool,
    plugins: Vec<Box<dyn MetricFactory>>,
    plugin_options: PluginOptions,
    flush_interval: Duration,
    percent: u8,
    max_payload_len: usize,
}

impl ProcessorBuilder {
    /// Creates a new `ProcessorBuilder` with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefix of counter rates, timers, gauges, meters and plugin metrics.
    ///
    /// Defaults to `stats`.
    #[must_use]
    pub fn with_stats_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.stats_prefix = prefix.into();
        self
    }

    /// Sets the prefix of raw counter counts.
    ///
    /// Defaults to `stats_counts`.
    #[must_use]
    pub fn with_count_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.count_prefix = prefix.into();
        self
    }

    /// Sets the prefix of the processor's own statistics.
    ///
    /// Defaults to `statsd`.
    #[must_use]
    pub fn with_internal_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.internal_prefix = prefix.into();
        self
    }

    /// Sets how timers sample durations across flushes.
    ///
    /// Defaults to [`ReservoirPolicy::ResetOnFlush`].
    #[must_use]
    pub fn with_reservoir_policy(mut self, policy: ReservoirPolicy) -> Self {
        self.reservoir_policy = policy;
        self
    }

    /// Sets the wall clock, used for flush timestamps, rates and time windows.
    ///
    /// Defaults to the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the clock used to measure processing and flush durations.
    ///
    /// Defaults to a real [`quanta::Clock`].
    #[must_use]
    pub fn with_timing_clock(mut self, clock: quanta::Clock) -> Self {
        self.timing_clock = clock;
        self
    }

    /// Sets whether the built-in plugins are registered.
    ///
    /// The built-in plugins handle the `pd` (distinct counts) and `sli` (service level indicators) metric types.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_default_plugins(mut self, enabled: bool) -> Self {
        self.default_plugins = enabled;
        self
    }

    /// Registers an additional plugin.
    #[must_use]
    pub fn with_plugin<F: MetricFactory + 'static>(mut self, factory: F) -> Self {
        self.plugins.push(Box::new(factory));
        self
    }

    /// Sets the options every plugin is configured with.
    #[must_use]
    pub fn with_plugin_options(mut self, options: PluginOptions) -> Self {
        self.plugin_options = options;
        self
    }

    /// Sets the flush interval of a spawned processor.
    ///
    /// Defaults to 10 seconds.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Sets the percentile reported by timers as `upper_<percent>` when spawned.
    ///
    /// Defaults to 90.
    #[must_use]
    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = percent;
        self
    }

    /// Sets the maximum length of a payload handed to the flush sink when spawned.
    ///
    /// Lines are never split across payloads, and a line longer than this is dropped.
    ///
    /// Defaults to 8192 bytes.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Builds the processor.
    ///
    /// # Errors
    ///
    /// If two plugins handle the same metric type, or a plugin rejects the plugin options, an error is returned.
    pub fn build(self) -> Result<MessageProcessor, BuildError> {
        let mut registry = PluginRegistry::new();
        if self.default_plugins {
            registry.register(Box::new(DistinctMetricFactory))?;
            registry.register(Box::new(SliMetricFactory::new()))?;
        }
        for factory in self.plugins {
            registry.register(factory)?;
        }
        registry.configure(&self.plugin_options)?;

        let config = ProcessorConfig {
            stats_prefix: self.stats_prefix,
            count_prefix: self.count_prefix,
            internal_prefix: self.internal_prefix,
            reservoir_policy: self.reservoir_policy,
        };

        Ok(MessageProcessor::new(config, registry, self.clock, self.timing_clock))
    }

    /// Builds the processor and spawns a background thread that drives it.
    ///
    /// The thread ticks meters every five seconds and, every flush interval, flushes the processor and hands the
    /// resulting payloads to `sink`. The returned handle is used to feed messages to the processor.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or the background thread cannot be spawned, an error is returned.
    pub fn spawn<S: FlushSink + 'static>(self, sink: S) -> Result<SharedProcessor, BuildError> {
        if self.flush_interval.is_zero() {
            return Err(BuildError::InvalidFlushInterval);
        }
        if self.percent == 0 || self.percent > 100 {
            return Err(BuildError::InvalidPercent(self.percent));
        }
        if self.max_payload_len < SMALLEST_VALID_PAYLOAD.len() {
            return Err(BuildError::InvalidMaxPayloadLength {
                len: self.max_payload_len,
                min: SMALLEST_VALID_PAYLOAD.len(),
            });
        }

        let (flush_interval, percent, max_payload_len) = (self.flush_interval, self.percent, self.max_payload_len);
        let processor = SharedProcessor::new(self.build()?);

        let scheduler = Scheduler::new(
            processor.clone(),
            GraphiteWriter::new(max_payload_len),
            Box::new(sink),
            flush_interval,
            METER_TICK_INTERVAL,
            percent,
            Instant::now(),
        );

        std::thread::Builder::new()
            .name("statsd-aggregator-scheduler".to_string())
            .spawn(move || scheduler.run())
            .map_err(|_| BuildError::Backend)?;

        Ok(processor)
    }
}

impl Default for ProcessorBuilder {
    fn default() -> Self {
        ProcessorBuilder {
            stats_prefix: DEFAULT_STATS_PREFIX.to_string(),
            count_prefix: DEFAULT_COUNT_PREFIX.to_string(),
            internal_prefix: DEFAULT_INTERNAL_PREFIX.to_string(),
            reservoir_policy: ReservoirPolicy::default(),
            clock: Arc::new(SystemClock),
            timing_clock: quanta::Clock::new(),
            default_plugins: true,
            plugins: Vec::new(),
            plugin_options: PluginOptions::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            percent: DEFAULT_PERCENT,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}
