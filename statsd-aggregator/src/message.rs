//! Parsing of StatsD wire messages.
//!
//! A message looks like `<key>:<value>|<type>[|<extra>]`. The key is everything before the first `:`, and the rest is
//! split on `|` into either two or three fields. For counters the optional third field is a sample rate, written as
//! `@<rate>`; other metric types either ignore it or, for plugin-provided types, interpret it themselves.
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::key::normalize_key;

static SAMPLE_RATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@([0-9.]+)").expect("valid regex"));

/// Errors that could occur while parsing a single message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The message was not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    /// The message had no `:` between the key and the value.
    #[error("missing ':' between key and value")]
    MissingValue,

    /// The message had no `|` between the value and the metric type.
    #[error("missing '|' between value and metric type")]
    MissingType,

    /// The message had too many fields after the key.
    #[error("expected 2 or 3 fields after the key, got {0}")]
    FieldCount(usize),

    /// The key was empty once normalized.
    #[error("metric key is empty")]
    EmptyKey,

    /// The value could not be parsed as a finite number.
    #[error("invalid value '{0}'")]
    InvalidValue(String),

    /// The sample rate field was malformed, or not a positive number.
    #[error("invalid sample rate '{0}'")]
    InvalidSampleRate(String),

    /// The extra field could not be interpreted by the metric type.
    #[error("invalid extra field '{0}'")]
    InvalidExtra(String),

    /// Nothing is registered to handle the metric type.
    #[error("unknown metric type '{0}'")]
    UnknownMetricType(String),
}

/// The kind of metric a message updates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// `c`: a counter, normalized to a per-second rate on flush.
    Counter,

    /// `ms`: a timer, in milliseconds.
    Timer,

    /// `g`: a gauge, every value of which is reported.
    Gauge,

    /// `m`: a meter, tracking the rate of events over time.
    Meter,

    /// Any other type, which must be handled by a registered plugin.
    Extension(String),
}

impl MetricKind {
    /// Gets the kind of metric for the given wire type tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "c" => MetricKind::Counter,
            "ms" => MetricKind::Timer,
            "g" => MetricKind::Gauge,
            "m" => MetricKind::Meter,
            other => MetricKind::Extension(other.to_string()),
        }
    }

    /// Gets the wire type tag.
    pub fn tag(&self) -> &str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Timer => "ms",
            MetricKind::Gauge => "g",
            MetricKind::Meter => "m",
            MetricKind::Extension(tag) => tag,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single message, split into its key and fields.
///
/// The key is normalized with [`normalize_key`]. The fields borrow from the original line: the value is always the
/// first field and the metric type tag the second.
#[derive(Debug)]
pub struct Message<'a> {
    key: String,
    fields: Vec<&'a str>,
}

impl<'a> Message<'a> {
    /// Parses a message.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// If the message doesn't have a key, a value and a metric type, or has more than one extra field, an error is
    /// returned. The value and extra field are not interpreted here.
    pub fn parse(line: &'a str) -> Result<Self, ParseError> {
        let (raw_key, data) = line.trim().split_once(':').ok_or(ParseError::MissingValue)?;
        if !data.contains('|') {
            return Err(ParseError::MissingType);
        }

        let fields = data.split('|').collect::<Vec<_>>();
        if fields.len() > 3 {
            return Err(ParseError::FieldCount(fields.len()));
        }

        let key = normalize_key(raw_key);
        if key.is_empty() {
            return Err(ParseError::EmptyKey);
        }

        Ok(Message { key, fields })
    }

    /// Gets the normalized key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Gets the raw value.
    pub fn value(&self) -> &'a str {
        self.fields[0]
    }

    /// Gets the kind of metric this message updates.
    pub fn kind(&self) -> MetricKind {
        MetricKind::from_tag(self.fields[1])
    }

    /// Gets the extra field, if any.
    pub fn extra(&self) -> Option<&'a str> {
        self.fields.get(2).copied()
    }

    /// Gets all fields: the value, the metric type and the optional extra field.
    pub fn fields(&self) -> &[&'a str] {
        &self.fields
    }

    /// Consumes the message, returning the normalized key.
    pub fn into_key(self) -> String {
        self.key
    }
}

/// Parses a metric value.
///
/// # Errors
///
/// If the value is not a finite number, an error is returned.
pub fn parse_value(raw: &str) -> Result<f64, ParseError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::InvalidValue(raw.to_string())),
    }
}

/// Parses a gauge or meter value, which must be a single number.
///
/// # Errors
///
/// If the value holds more than one `:`-separated part, or is not a finite number, an error is returned.
pub fn parse_single_value(raw: &str) -> Result<f64, ParseError> {
    if raw.contains(':') {
        return Err(ParseError::InvalidValue(raw.to_string()));
    }

    parse_value(raw)
}

/// Parses a counter sample rate field, such as `@0.1`.
///
/// # Errors
///
/// If the field does not start with `@` followed by a positive number, an error is returned.
pub fn parse_sample_rate(field: &str) -> Result<f64, ParseError> {
    SAMPLE_RATE
        .captures(field)
        .and_then(|captures| captures.get(1))
        .and_then(|rate| rate.as_str().parse::<f64>().ok())
        .filter(|rate| rate.is_finite() && *rate > 0.0)
        .ok_or_else(|| ParseError::InvalidSampleRate(field.to_string()))
}

/// Renders a key and its fields back into wire format.
pub fn rebuild_message(key: &str, fields: &[&str]) -> String {
    let mut message = String::with_capacity(key.len() + 1 + fields.iter().map(|f| f.len() + 1).sum::<usize>());
    message.push_str(key);
    message.push(':');
    message.push_str(&fields.join("|"));
    message
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        parse_sample_rate, parse_single_value, parse_value, rebuild_message, Message, MetricKind, ParseError,
    };

    #[test]
    fn parse_messages() {
        let message = Message::parse("gorets:1|c").unwrap();
        assert_eq!(message.key(), "gorets");
        assert_eq!(message.value(), "1");
        assert_eq!(message.kind(), MetricKind::Counter);
        assert_eq!(message.extra(), None);

        let message = Message::parse("gorets:1|c|@0.1").unwrap();
        assert_eq!(message.extra(), Some("@0.1"));

        let message = Message::parse("  glork:320|ms\n").unwrap();
        assert_eq!(message.key(), "glork");
        assert_eq!(message.kind(), MetricKind::Timer);

        let message = Message::parse("some key/with spaces:9.6|g").unwrap();
        assert_eq!(message.key(), "some_key-with_spaces");
        assert_eq!(message.kind(), MetricKind::Gauge);

        let message = Message::parse("gorets:item1|pd").unwrap();
        assert_eq!(message.kind(), MetricKind::Extension("pd".to_string()));
        assert_eq!(message.fields(), &["item1", "pd"]);

        // Only the first colon splits the key from the value.
        let message = Message::parse("gorets:1:2|g").unwrap();
        assert_eq!(message.value(), "1:2");
    }

    #[test]
    fn parse_failures() {
        let cases = [
            ("glork", ParseError::MissingValue),
            ("glork:1", ParseError::MissingType),
            ("gorets:1|c|@0.1|yay", ParseError::FieldCount(4)),
            ("@@@:1|c", ParseError::EmptyKey),
        ];

        for (line, expected) in cases {
            assert_eq!(Message::parse(line).unwrap_err(), expected, "parsing {:?}", line);
        }
    }

    #[test]
    fn kinds() {
        for tag in ["c", "ms", "g", "m", "pd", "sli"] {
            assert_eq!(MetricKind::from_tag(tag).tag(), tag);
        }
        assert_eq!(MetricKind::Meter.to_string(), "m");
    }

    #[test]
    fn values() {
        assert_eq!(parse_value("17"), Ok(17.0));
        assert_eq!(parse_value("-3.5"), Ok(-3.5));
        assert_eq!(parse_value("1e3"), Ok(1000.0));
        assert!(parse_value("").is_err());
        assert!(parse_value("one").is_err());
        assert!(parse_value("NaN").is_err());
        assert!(parse_value("inf").is_err());

        assert_eq!(parse_single_value("9.6"), Ok(9.6));
        assert_eq!(parse_single_value("1:2"), Err(ParseError::InvalidValue("1:2".to_string())));
    }

    #[test]
    fn sample_rates() {
        assert_eq!(parse_sample_rate("@0.1"), Ok(0.1));
        assert_eq!(parse_sample_rate("@1"), Ok(1.0));
        assert_eq!(parse_sample_rate("@.5"), Ok(0.5));

        for field in ["0.1", "@", "@0", "@-1", "@1.2.3", "@abc", "#tag"] {
            assert!(parse_sample_rate(field).is_err(), "parsing {:?}", field);
        }
    }

    #[test]
    fn rebuild() {
        assert_eq!(rebuild_message("gorets", &["1", "c"]), "gorets:1|c");
        assert_eq!(rebuild_message("gorets", &["1", "c", "@0.1"]), "gorets:1|c|@0.1");
    }

    proptest! {
        #[test]
        fn parse_never_panics(line in "\\PC*") {
            let _ = Message::parse(&line);
        }

        #[test]
        fn parsed_messages_rebuild(key in "[a-z][a-z0-9.]{0,16}", value in "[0-9]{1,6}", tag in "(c|ms|g|m)") {
            let line = format!("{}:{}|{}", key, value, tag);
            let message = Message::parse(&line).unwrap();
            prop_assert_eq!(rebuild_message(message.key(), message.fields()), line);
        }
    }
}
