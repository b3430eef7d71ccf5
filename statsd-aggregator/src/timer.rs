use crate::processor::SharedProcessor;

/// Times a scope and records the outcome into a processor.
///
/// On creation, `<key>.in_flight` is incremented. On drop, it is decremented again, the elapsed time is recorded as a
/// timer under `<key>`, and either `<key>.success` or `<key>.error` is incremented depending on whether
/// [`succeed`](Self::succeed) was called.
///
/// The key is normalized like the key of any message, so it may contain characters such as `:` or `|`.
///
/// The processor is locked on creation and again on drop, so a `ScopedTimer` must not be dropped while the same
/// thread holds [`SharedProcessor::lock`].
///
/// ```
/// # use statsd_aggregator::{ProcessorBuilder, ScopedTimer, SharedProcessor};
/// let processor = SharedProcessor::new(ProcessorBuilder::new().build().unwrap());
///
/// let mut timer = ScopedTimer::new(processor.clone(), "db.query");
/// // ... run the query ...
/// timer.succeed();
/// drop(timer);
///
/// assert!(processor.lock().timer("db.query").is_some());
/// ```
pub struct ScopedTimer {
    processor: SharedProcessor,
    key: String,
    clock: quanta::Clock,
    start: quanta::Instant,
    succeeded: bool,
}

impl ScopedTimer {
    /// Starts timing under `key`.
    pub fn new<K: Into<String>>(processor: SharedProcessor, key: K) -> Self {
        let key = key.into();
        let (clock, start) = {
            let mut inner = processor.lock();
            inner.increment_counter(&format!("{}.in_flight", key), 1.0);

            let clock = inner.timing_clock().clone();
            let start = clock.now();
            (clock, start)
        };

        ScopedTimer { processor, key, clock, start, succeeded: false }
    }

    /// Marks the timed operation as successful.
    pub fn succeed(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.clock.now().saturating_duration_since(self.start);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let outcome = if self.succeeded { "success" } else { "error" };

        let mut processor = self.processor.lock();
        processor.increment_counter(&format!("{}.in_flight", self.key), -1.0);
        processor.record_timing(&self.key, elapsed_ms);
        processor.increment_counter(&format!("{}.{}", self.key, outcome), 1.0);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use statsd_util::MockClock;

    use super::ScopedTimer;
    use crate::{builder::ProcessorBuilder, processor::SharedProcessor};

    fn shared() -> (SharedProcessor, Arc<quanta::Mock>) {
        let (timing_clock, mock) = quanta::Clock::mock();
        let processor = ProcessorBuilder::new()
            .with_clock(Arc::new(MockClock::new(1000.0)))
            .with_timing_clock(timing_clock)
            .build()
            .unwrap();
        (SharedProcessor::new(processor), mock)
    }

    fn counter_value(processor: &SharedProcessor, key: &str) -> Option<f64> {
        processor.lock().counter(key).map(|counter| counter.value())
    }

    #[test]
    fn success() {
        let (processor, mock) = shared();

        let mut timer = ScopedTimer::new(processor.clone(), "db.query");
        assert_eq!(counter_value(&processor, "db.query.in_flight"), Some(1.0));

        mock.increment(Duration::from_millis(250));
        timer.succeed();
        drop(timer);

        assert_eq!(counter_value(&processor, "db.query.in_flight"), Some(0.0));
        assert_eq!(counter_value(&processor, "db.query.success"), Some(1.0));
        assert_eq!(counter_value(&processor, "db.query.error"), None);

        let inner = processor.lock();
        let timer = inner.timer("db.query").unwrap();
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.histogram().max(), 250.0);
        assert_eq!(inner.bad_lines(), 0);
    }

    #[test]
    fn error_unless_succeeded() {
        let (processor, _mock) = shared();
        {
            let _timer = ScopedTimer::new(processor.clone(), "db.query");
        }

        assert_eq!(counter_value(&processor, "db.query.error"), Some(1.0));
        assert_eq!(counter_value(&processor, "db.query.success"), None);
        assert_eq!(processor.lock().timer("db.query").unwrap().histogram().max(), 0.0);
    }

    #[test]
    fn keys_are_normalized() {
        let (processor, mock) = shared();

        let mut timer = ScopedTimer::new(processor.clone(), "http:get");
        assert_eq!(counter_value(&processor, "httpget.in_flight"), Some(1.0));

        mock.increment(Duration::from_millis(40));
        timer.succeed();
        drop(timer);

        let inner = processor.lock();
        assert_eq!(inner.bad_lines(), 0);
        assert_eq!(
            inner.metric_names(),
            vec!["httpget".to_string(), "httpget.in_flight".to_string(), "httpget.success".to_string()]
        );
        assert_eq!(inner.counter("httpget.in_flight").map(|counter| counter.value()), Some(0.0));
        assert_eq!(inner.counter("httpget.success").map(|counter| counter.value()), Some(1.0));
        assert_eq!(inner.timer("httpget").map(|timer| timer.histogram().max()), Some(40.0));
    }
}
