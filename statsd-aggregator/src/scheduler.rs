use std::{
    io,
    thread::sleep,
    time::{Duration, Instant},
};

use tracing::{debug, error, trace};

use crate::{processor::SharedProcessor, writer::GraphiteWriter};

/// A destination for flushed payloads, such as a connection to a Graphite server.
pub trait FlushSink: Send {
    /// Sends a single payload of newline-terminated Graphite lines.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned. The payload is dropped, and the next flush carries on as
    /// usual.
    fn send(&mut self, payload: &[u8]) -> io::Result<()>;
}

impl<F> FlushSink for F
where
    F: FnMut(&[u8]) -> io::Result<()> + Send,
{
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self(payload)
    }
}

/// The outcome of a single flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of datapoints flushed by the processor.
    pub datapoints: usize,

    /// Number of datapoints that could not be written.
    pub points_dropped: u64,

    /// Number of payloads handed to the sink successfully.
    pub payloads_sent: usize,

    /// Number of payloads the sink failed to send.
    pub payloads_failed: usize,
}

/// Drives a [`SharedProcessor`]: ticks its meters on a fixed schedule, and periodically flushes it to a [`FlushSink`].
pub(crate) struct Scheduler {
    processor: SharedProcessor,
    writer: GraphiteWriter,
    sink: Box<dyn FlushSink>,
    flush_interval: Duration,
    meter_tick_interval: Duration,
    percent: u8,
    next_flush: Instant,
    next_tick: Instant,
}

impl Scheduler {
    pub fn new(
        processor: SharedProcessor,
        writer: GraphiteWriter,
        sink: Box<dyn FlushSink>,
        flush_interval: Duration,
        meter_tick_interval: Duration,
        percent: u8,
        start: Instant,
    ) -> Self {
        Scheduler {
            processor,
            writer,
            sink,
            flush_interval,
            meter_tick_interval,
            percent,
            next_flush: start + flush_interval,
            next_tick: start + meter_tick_interval,
        }
    }

    /// Runs the scheduler forever.
    pub fn run(mut self) {
        loop {
            // If the previous iteration overran the next deadline, we don't sleep at all.
            let deadline = self.next_flush.min(self.next_tick);
            if let Some(sleep_duration) = deadline.checked_duration_since(Instant::now()) {
                sleep(sleep_duration);
            }

            self.poll(Instant::now());
        }
    }

    /// Runs whatever is due at `now`: a meter tick, a flush, or both.
    ///
    /// Returns the report of the flush, if one ran.
    pub fn poll(&mut self, now: Instant) -> Option<FlushReport> {
        if now >= self.next_tick {
            trace!("Ticking meters.");
            self.processor.tick_meters();
            self.next_tick = now + self.meter_tick_interval;
        }

        if now >= self.next_flush {
            self.next_flush = now + self.flush_interval;
            return Some(self.flush());
        }

        None
    }

    /// Flushes the processor and sends out every resulting payload.
    pub fn flush(&mut self) -> FlushReport {
        let datapoints = self.processor.flush(self.flush_interval, self.percent);

        let result = self.writer.write_all(&datapoints);
        if result.any_failures() {
            error!(points_dropped = result.points_dropped(), "Failed to write datapoints to payload.");
        }

        let mut report = FlushReport {
            datapoints: datapoints.len(),
            points_dropped: result.points_dropped(),
            ..FlushReport::default()
        };

        let mut payloads = self.writer.payloads();
        debug!(datapoints = datapoints.len(), num_payloads = payloads.len(), "Sending flushed payloads.");

        while let Some(payload) = payloads.next_payload() {
            if let Err(e) = self.sink.send(payload) {
                error!(error = %e, "Failed to send payload.");
                report.payloads_failed += 1;
            } else {
                report.payloads_sent += 1;
            }
        }

        report
    }
}
