use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use once_cell::sync::Lazy;
use regex::Regex;
use statsd_util::Clock;

use super::{join_path, sort_by_path, Datapoint};
use crate::{
    message::{parse_value, ParseError},
    plugin::{ConfigError, MetricFactory, PluginMetric, PluginOptions},
};

const CONFIG_SECTION: &str = "plugin_sli";
const CONFIG_RULES: &str = "rules";
const ERROR_VALUE: &str = "error";

static RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w.*?\-]+) => (\w+) IF (\w+)(.*)$").expect("valid regex"));

/// A service level condition that a measured value either meets or doesn't.
///
/// `Below` and `Above` thresholds may grow linearly with the size of the measured operation: for a size `s`, the
/// effective threshold is `value + slope * s`. Comparisons are strict.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Condition {
    /// Met by values below the threshold.
    Below {
        /// Threshold for an operation of size zero.
        value: f64,
        /// Threshold increase per unit of size.
        slope: f64,
    },

    /// Met by values above the threshold.
    Above {
        /// Threshold for an operation of size zero.
        value: f64,
        /// Threshold increase per unit of size.
        slope: f64,
    },

    /// Met by values strictly between `low` and `high`.
    Between {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },
}

impl Condition {
    /// Returns `true` if `value`, measured for an operation of the given size, meets the condition.
    pub fn matches(&self, value: f64, size: f64) -> bool {
        match *self {
            Condition::Below { value: threshold, slope } => value < threshold + slope * size,
            Condition::Above { value: threshold, slope } => value > threshold + slope * size,
            Condition::Between { low, high } => low < value && value < high,
        }
    }

    fn parse(line: usize, name: &str, params: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidParameters {
            line,
            condition: name.to_string(),
            params: params.trim().to_string(),
        };

        let values = params
            .split_whitespace()
            .map(|param| param.parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;

        match (name, values.as_slice()) {
            ("below", [value]) => Ok(Condition::Below { value: *value, slope: 0.0 }),
            ("below", [value, slope]) => Ok(Condition::Below { value: *value, slope: *slope }),
            ("above", [value]) => Ok(Condition::Above { value: *value, slope: 0.0 }),
            ("above", [value, slope]) => Ok(Condition::Above { value: *value, slope: *slope }),
            ("between", [low, high]) => Ok(Condition::Between { low: *low, high: *high }),
            ("below" | "above" | "between", _) => Err(invalid()),
            _ => Err(ConfigError::UnknownCondition { line, condition: name.to_string() }),
        }
    }
}

/// Counts how many measurements of an operation meet each of a set of labeled conditions.
///
/// A measurement is a number, optionally followed by the size of the operation in the extra field
/// (`<key>:<value>|sli|<size>`), or the literal value `error` for a failed operation. Every measurement is counted;
/// errors are counted separately and never meet any condition.
pub struct SliReporter {
    path: String,
    conditions: Vec<(String, Condition)>,
    counts: Vec<u64>,
    count: u64,
    error: u64,
}

impl SliReporter {
    /// Creates a new `SliReporter` reporting under `path`.
    pub fn new(path: String, conditions: Vec<(String, Condition)>) -> Self {
        let counts = vec![0; conditions.len()];
        SliReporter { path, conditions, counts, count: 0, error: 0 }
    }

    /// Records a measurement of an operation of the given size.
    pub fn update(&mut self, value: f64, size: f64) {
        self.count += 1;
        for ((_, condition), count) in self.conditions.iter().zip(self.counts.iter_mut()) {
            if condition.matches(value, size) {
                *count += 1;
            }
        }
    }

    /// Records a failed operation.
    pub fn update_error(&mut self) {
        self.count += 1;
        self.error += 1;
    }

    /// Gets the number of measurements since the last flush.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Gets the number of failed operations since the last flush.
    pub fn error_count(&self) -> u64 {
        self.error
    }

    /// Gets the number of measurements since the last flush that met the condition with the given label.
    pub fn condition_count(&self, label: &str) -> Option<u64> {
        self.conditions.iter().position(|(l, _)| l == label).map(|i| self.counts[i])
    }

    /// Gets the conditions.
    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    fn clear(&mut self) {
        self.counts.iter_mut().for_each(|count| *count = 0);
        self.count = 0;
        self.error = 0;
    }
}

impl PluginMetric for SliReporter {
    fn process(&mut self, fields: &[&str]) -> Result<(), ParseError> {
        let size = match fields.get(2) {
            Some(extra) => parse_value(extra).map_err(|_| ParseError::InvalidExtra(extra.to_string()))?,
            None => 0.0,
        };

        if fields[0] == ERROR_VALUE {
            self.update_error();
        } else {
            self.update(parse_value(fields[0])?, size);
        }

        Ok(())
    }

    fn flush(&mut self, _interval_secs: f64, timestamp: u64) -> Vec<Datapoint> {
        let mut datapoints = Vec::with_capacity(self.conditions.len() + 2);
        datapoints.push(Datapoint::new(join_path(&self.path, "count"), self.count as f64, timestamp));
        for ((label, _), count) in self.conditions.iter().zip(&self.counts) {
            let path = join_path(&self.path, &format!("count_{}", label));
            datapoints.push(Datapoint::new(path, *count as f64, timestamp));
        }
        datapoints.push(Datapoint::new(join_path(&self.path, "error"), self.error as f64, timestamp));
        sort_by_path(&mut datapoints);

        self.clear();
        datapoints
    }
}

struct Rule {
    matcher: GlobMatcher,
    label: String,
    condition: Condition,
}

/// Builds [`SliReporter`]s for the `sli` metric type.
///
/// Conditions come from the `rules` option of the `plugin_sli` section, one rule per line:
///
/// ```text
/// <pattern> => <label> IF below <value> [<slope>]
/// <pattern> => <label> IF above <value> [<slope>]
/// <pattern> => <label> IF between <low> <high>
/// ```
///
/// Patterns are globs matched against the full metric path, such as `stats.SLI.web.*`. A metric gets the conditions
/// of every rule it matches; when several rules share a label, the last one wins.
#[derive(Default)]
pub struct SliMetricFactory {
    rules: Vec<Rule>,
}

impl SliMetricFactory {
    /// Creates a new `SliMetricFactory` without any rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the given rules, replacing any existing ones.
    ///
    /// # Errors
    ///
    /// If any rule is malformed, an error is returned and the existing rules are left untouched.
    pub fn set_rules(&mut self, rules: &str) -> Result<(), ConfigError> {
        let lines = rules.lines().map(str::trim).filter(|line| !line.is_empty());
        self.rules = lines.enumerate().map(|(line, rule)| parse_rule(line, rule)).collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Gets the conditions applying to the metric at `path`.
    pub fn conditions_for(&self, path: &str) -> Vec<(String, Condition)> {
        let mut conditions: Vec<(String, Condition)> = Vec::new();
        for rule in self.rules.iter().filter(|rule| rule.matcher.is_match(path)) {
            match conditions.iter_mut().find(|(label, _)| *label == rule.label) {
                Some(existing) => existing.1 = rule.condition,
                None => conditions.push((rule.label.clone(), rule.condition)),
            }
        }
        conditions
    }
}

fn parse_rule(line: usize, rule: &str) -> Result<Rule, ConfigError> {
    let captures =
        RULE.captures(rule).ok_or_else(|| ConfigError::MalformedRule { line, rule: rule.to_string() })?;

    let pattern = &captures[1];
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map_err(|source| ConfigError::InvalidPattern { pattern: pattern.to_string(), source })?
        .compile_matcher();
    let condition = Condition::parse(line, &captures[3], &captures[4])?;

    Ok(Rule { matcher, label: captures[2].to_string(), condition })
}

impl MetricFactory for SliMetricFactory {
    fn name(&self) -> &str {
        "SLI"
    }

    fn metric_type(&self) -> &str {
        "sli"
    }

    fn build_metric(&self, prefix: &str, name: &str, _clock: Arc<dyn Clock>) -> Box<dyn PluginMetric> {
        let path = join_path(prefix, name);
        let conditions = self.conditions_for(&path);
        Box::new(SliReporter::new(path, conditions))
    }

    fn configure(&mut self, options: &PluginOptions) -> Result<(), ConfigError> {
        match options.get(CONFIG_SECTION, CONFIG_RULES) {
            Some(rules) => self.set_rules(rules),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use statsd_util::MockClock;

    use super::{Condition, SliMetricFactory, SliReporter};
    use crate::{
        message::ParseError,
        plugin::{ConfigError, MetricFactory, PluginMetric, PluginOptions},
        reporter::Datapoint,
    };

    fn below(value: f64) -> Condition {
        Condition::Below { value, slope: 0.0 }
    }

    #[test]
    fn conditions() {
        let c = below(5.0);
        assert!(c.matches(2.0, 0.0));
        assert!(!c.matches(6.0, 0.0));
        assert!(!c.matches(5.0, 0.0));

        let c = Condition::Above { value: 5.0, slope: 0.0 };
        assert!(!c.matches(2.0, 0.0));
        assert!(c.matches(6.0, 0.0));

        let c = Condition::Between { low: 2.5, high: 5.0 };
        assert!(!c.matches(2.0, 0.0));
        assert!(!c.matches(6.0, 0.0));
        assert!(c.matches(2.6, 0.0));
        assert!(!c.matches(5.0, 0.0));
    }

    #[test]
    fn linear_conditions() {
        let c = Condition::Below { value: 5.0, slope: 1.0 };
        assert!(c.matches(5.5, 1.0));
        assert!(c.matches(6.5, 2.0));
        assert!(!c.matches(8.5, 3.0));

        let c = Condition::Above { value: 4.0, slope: 1.0 };
        assert!(c.matches(5.5, 1.0));
        assert!(c.matches(6.5, 2.0));
        assert!(!c.matches(7.0, 3.0));
    }

    fn traffic_light() -> SliReporter {
        SliReporter::new("test".to_string(), vec![("red".to_string(), below(5.0)), ("yellow".to_string(), below(3.0))])
    }

    #[test]
    fn thresholds() {
        let mut sli = traffic_light();
        for i in 1..7 {
            sli.update(f64::from(i), 0.0);
        }

        assert_eq!(sli.count(), 6);
        assert_eq!(sli.condition_count("red"), Some(4));
        assert_eq!(sli.condition_count("yellow"), Some(2));
        assert_eq!(sli.condition_count("green"), None);

        assert_eq!(
            sli.flush(0.0, 0),
            vec![
                Datapoint::new("test.count", 6.0, 0),
                Datapoint::new("test.count_red", 4.0, 0),
                Datapoint::new("test.count_yellow", 2.0, 0),
                Datapoint::new("test.error", 0.0, 0),
            ]
        );

        // Flushing clears everything.
        assert_eq!(sli.count(), 0);
        assert_eq!(sli.condition_count("red"), Some(0));
        sli.update(1.0, 0.0);
        assert_eq!(sli.count(), 1);
    }

    #[test]
    fn linear_thresholds() {
        let mut sli = SliReporter::new(
            "test".to_string(),
            vec![
                ("red".to_string(), Condition::Below { value: 5.0, slope: 1.0 }),
                ("yellow".to_string(), Condition::Below { value: 3.0, slope: 1.0 }),
            ],
        );
        for size in 1..7 {
            sli.update(7.0, f64::from(size));
        }

        assert_eq!(sli.count(), 6);
        assert_eq!(sli.condition_count("red"), Some(4));
        assert_eq!(sli.condition_count("yellow"), Some(2));
    }

    #[test]
    fn processing() {
        let mut sli = traffic_light();
        sli.process(&["1", "sli"]).unwrap();
        sli.process(&["error", "sli"]).unwrap();
        sli.process(&["7", "sli", "4"]).unwrap();

        assert_eq!(sli.count(), 3);
        assert_eq!(sli.error_count(), 1);
        assert_eq!(sli.condition_count("red"), Some(1));

        assert_eq!(sli.process(&["slow", "sli"]), Err(ParseError::InvalidValue("slow".to_string())));
        assert_eq!(sli.process(&["1", "sli", "big"]), Err(ParseError::InvalidExtra("big".to_string())));
        assert_eq!(sli.count(), 3);
    }

    #[test]
    fn configure() {
        let rules = "
            test_o-k => red IF below 5
            test_o-k => green IF between 0.1 3
            other* => red IF above 4
            linear => red IF below 5 1
        ";
        let mut factory = SliMetricFactory::new();
        factory.configure(&PluginOptions::new().with_option("plugin_sli", "rules", rules)).unwrap();

        assert_eq!(
            factory.conditions_for("test_o-k"),
            vec![
                ("red".to_string(), below(5.0)),
                ("green".to_string(), Condition::Between { low: 0.1, high: 3.0 }),
            ]
        );
        assert_eq!(factory.conditions_for("otherXX"), vec![("red".to_string(), Condition::Above { value: 4.0, slope: 0.0 })]);
        assert_eq!(factory.conditions_for("linear"), vec![("red".to_string(), Condition::Below { value: 5.0, slope: 1.0 })]);
        assert!(factory.conditions_for("unmatched").is_empty());

        let clock = Arc::new(MockClock::new(0.0));
        let mut metric = factory.build_metric("", "otherXX", clock);
        metric.process(&["5", "sli"]).unwrap();
        let datapoints = metric.flush(10.0, 1);
        assert_eq!(datapoints[1], Datapoint::new("otherXX.count_red", 1.0, 1));
    }

    #[test]
    fn prefixed_patterns() {
        let mut factory = SliMetricFactory::new();
        factory.set_rules("stats.SLI.web.* => fast IF below 100").unwrap();

        assert_eq!(factory.conditions_for("stats.SLI.web.login").len(), 1);
        assert!(factory.conditions_for("stats.SLI.db.query").is_empty());
    }

    #[test]
    fn later_rules_win() {
        let mut factory = SliMetricFactory::new();
        factory.set_rules("web.* => fast IF below 100\nweb.login => fast IF below 50").unwrap();
        assert_eq!(factory.conditions_for("web.login"), vec![("fast".to_string(), below(50.0))]);
    }

    #[test]
    fn bad_rules() {
        let mut factory = SliMetricFactory::new();
        factory.set_rules("good => red IF below 5").unwrap();

        assert!(matches!(factory.set_rules("nonsense"), Err(ConfigError::MalformedRule { line: 0, .. })));
        assert!(matches!(
            factory.set_rules("a => red IF below 5\nb => red IF around 5"),
            Err(ConfigError::UnknownCondition { line: 1, .. })
        ));
        assert!(matches!(factory.set_rules("a => red IF below"), Err(ConfigError::InvalidParameters { .. })));
        assert!(matches!(factory.set_rules("a => red IF below five"), Err(ConfigError::InvalidParameters { .. })));
        assert!(matches!(factory.set_rules("a => red IF between 1"), Err(ConfigError::InvalidParameters { .. })));
        assert!(matches!(factory.set_rules("a => red IF above 1 2 3"), Err(ConfigError::InvalidParameters { .. })));

        // Failed updates leave the previous rules in place.
        assert_eq!(factory.conditions_for("good").len(), 1);
    }

    #[test]
    fn unconfigured() {
        let mut factory = SliMetricFactory::new();
        factory.configure(&PluginOptions::new()).unwrap();
        assert!(factory.conditions_for("anything").is_empty());
    }
}
