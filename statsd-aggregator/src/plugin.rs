//! Pluggable metric types.
//!
//! Besides the built-in counters, timers, gauges and meters, the processor hands any message whose type tag has a
//! registered [`MetricFactory`] to a [`PluginMetric`] built by that factory, one per key.
use std::{fmt, sync::Arc};

use hashbrown::HashMap;
use statsd_util::Clock;
use thiserror::Error;

use crate::{message::ParseError, reporter::Datapoint};

/// Errors that could occur while configuring plugins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two factories were registered for the same metric type.
    #[error("metric type '{0}' is already registered")]
    DuplicateMetricType(String),

    /// A rule did not have the expected shape.
    #[error("rule {line} does not match '<pattern> => <label> IF <condition> <params>': {rule}")]
    MalformedRule {
        /// Zero-based line number of the rule.
        line: usize,

        /// The rule itself.
        rule: String,
    },

    /// A rule named a condition that does not exist.
    #[error("rule {line} has unknown condition '{condition}'")]
    UnknownCondition {
        /// Zero-based line number of the rule.
        line: usize,

        /// Name of the condition.
        condition: String,
    },

    /// A rule had the wrong number of parameters, or parameters that are not numbers.
    #[error("rule {line} has invalid parameters '{params}' for condition '{condition}'")]
    InvalidParameters {
        /// Zero-based line number of the rule.
        line: usize,

        /// Name of the condition.
        condition: String,

        /// The parameters as written.
        params: String,
    },

    /// A rule pattern is not a valid glob.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,

        /// Details about the failure.
        #[source]
        source: globset::Error,
    },
}

/// Plugin configuration, as sections of key/value options.
#[derive(Clone, Debug, Default)]
pub struct PluginOptions {
    sections: HashMap<String, HashMap<String, String>>,
}

impl PluginOptions {
    /// Creates an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option.
    #[must_use]
    pub fn with_option<S, K, V>(mut self, section: S, key: K, value: V) -> Self
    where
        S: Into<String>,
        K: Into<String>,
        V: Into<String>,
    {
        self.set(section, key, value);
        self
    }

    /// Sets an option.
    pub fn set<S, K, V>(&mut self, section: S, key: K, value: V)
    where
        S: Into<String>,
        K: Into<String>,
        V: Into<String>,
    {
        self.sections.entry(section.into()).or_default().insert(key.into(), value.into());
    }

    /// Gets an option.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section).and_then(|options| options.get(key)).map(String::as_str)
    }
}

/// A metric provided by a plugin.
pub trait PluginMetric: Send {
    /// Processes the fields of a message: the value, the type tag, and the optional extra field.
    ///
    /// # Errors
    ///
    /// If the fields cannot be interpreted, an error is returned and the message is counted as a bad line.
    fn process(&mut self, fields: &[&str]) -> Result<(), ParseError>;

    /// Flushes the metric.
    fn flush(&mut self, interval_secs: f64, timestamp: u64) -> Vec<Datapoint>;
}

/// A factory of plugin metrics for a single metric type.
pub trait MetricFactory: Send + Sync {
    /// Gets the name of the plugin, used as the path component under which its metrics are reported.
    fn name(&self) -> &str;

    /// Gets the wire type tag handled by this factory.
    fn metric_type(&self) -> &str;

    /// Builds the metric for `name`, reporting under `prefix`.
    fn build_metric(&self, prefix: &str, name: &str, clock: Arc<dyn Clock>) -> Box<dyn PluginMetric>;

    /// Configures the factory.
    ///
    /// # Errors
    ///
    /// If the options are invalid, an error is returned.
    fn configure(&mut self, options: &PluginOptions) -> Result<(), ConfigError> {
        let _ = options;
        Ok(())
    }
}

/// Registered plugin factories, by metric type.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, Box<dyn MetricFactory>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory.
    ///
    /// # Errors
    ///
    /// If a factory is already registered for the same metric type, an error is returned.
    pub fn register(&mut self, factory: Box<dyn MetricFactory>) -> Result<(), ConfigError> {
        let metric_type = factory.metric_type().to_string();
        if self.factories.contains_key(&metric_type) {
            return Err(ConfigError::DuplicateMetricType(metric_type));
        }

        self.factories.insert(metric_type, factory);
        Ok(())
    }

    /// Configures every registered factory.
    ///
    /// # Errors
    ///
    /// If any factory rejects the options, the first error is returned.
    pub fn configure(&mut self, options: &PluginOptions) -> Result<(), ConfigError> {
        self.factories.values_mut().try_for_each(|factory| factory.configure(options))
    }

    /// Gets the factory for a metric type.
    pub fn get(&self, metric_type: &str) -> Option<&dyn MetricFactory> {
        self.factories.get(metric_type).map(|factory| factory.as_ref())
    }

    /// Returns `true` if a factory is registered for the metric type.
    pub fn contains(&self, metric_type: &str) -> bool {
        self.factories.contains_key(metric_type)
    }

    /// Gets the number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factories are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types = self.factories.keys().collect::<Vec<_>>();
        types.sort();
        f.debug_struct("PluginRegistry").field("metric_types", &types).finish()
    }
}
