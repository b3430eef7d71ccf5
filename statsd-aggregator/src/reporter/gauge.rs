use super::{join_path, Datapoint};

/// Every gauge value received since the last flush, across all keys.
///
/// Gauges are not collapsed to their last value: each update is reported individually, in arrival order. The queue
/// has no upper bound between flushes, so a sender flooding gauge updates grows it until the next flush drains it.
#[derive(Debug, Default)]
pub struct GaugeQueue {
    prefix: String,
    entries: Vec<(String, f64)>,
}

impl GaugeQueue {
    /// Creates a new `GaugeQueue` reporting under `prefix`.
    pub fn new(prefix: String) -> Self {
        GaugeQueue { prefix, entries: Vec::new() }
    }

    /// Appends a gauge value.
    pub fn push(&mut self, key: String, value: f64) {
        self.entries.push((key, value));
    }

    /// Gets the number of pending values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no values are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the keys of the pending values.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Flushes every pending value as `<prefix>.<key>.value`, in arrival order.
    pub fn flush(&mut self, timestamp: u64) -> Vec<Datapoint> {
        let prefix = &self.prefix;
        self.entries
            .drain(..)
            .map(|(key, value)| Datapoint::new(join_path(prefix, &key) + ".value", value, timestamp))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::GaugeQueue;
    use crate::reporter::Datapoint;

    #[test]
    fn ordering() {
        let mut gauges = GaugeQueue::new("stats.gauge".to_string());
        gauges.push("gorets".to_string(), 3.0);
        gauges.push("gorets".to_string(), 1.0);
        gauges.push("gorets".to_string(), 2.0);
        assert_eq!(gauges.len(), 3);

        let datapoints = gauges.flush(42);
        assert_eq!(
            datapoints,
            vec![
                Datapoint::new("stats.gauge.gorets.value", 3.0, 42),
                Datapoint::new("stats.gauge.gorets.value", 1.0, 42),
                Datapoint::new("stats.gauge.gorets.value", 2.0, 42),
            ]
        );

        assert!(gauges.is_empty());
        assert!(gauges.flush(43).is_empty());
    }

    #[test]
    fn keys() {
        let mut gauges = GaugeQueue::new("stats.gauge".to_string());
        gauges.push("a".to_string(), 1.0);
        gauges.push("b".to_string(), 1.0);
        assert_eq!(gauges.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
