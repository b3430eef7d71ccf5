use std::{
    ops::{Deref, DerefMut},
    vec::Drain,
};

use crate::reporter::Datapoint;

pub(crate) const SMALLEST_VALID_PAYLOAD: &[u8] = b"a 0 0\n";

// Integral values up to this magnitude are exactly representable, and are written without a fractional part.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

struct ValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl ValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    /// Formats a finite value, or returns `None` for NaN and infinities.
    fn format(&mut self, value: f64) -> Option<&str> {
        if !value.is_finite() {
            return None;
        }

        if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
            Some(self.int_writer.format(value as i64))
        } else {
            Some(self.float_writer.format_finite(value))
        }
    }
}

/// The outcome of writing one or more datapoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteResult {
    points_written: u64,
    points_dropped: u64,
}

impl WriteResult {
    const fn success() -> Self {
        Self { points_written: 1, points_dropped: 0 }
    }

    const fn failure() -> Self {
        Self { points_written: 0, points_dropped: 1 }
    }

    fn merge(&mut self, other: WriteResult) {
        self.points_written += other.points_written;
        self.points_dropped += other.points_dropped;
    }

    /// Returns `true` if any datapoint was dropped.
    pub const fn any_failures(&self) -> bool {
        self.points_dropped != 0
    }

    /// Gets the number of datapoints written.
    pub const fn points_written(&self) -> u64 {
        self.points_written
    }

    /// Gets the number of datapoints dropped.
    pub const fn points_dropped(&self) -> u64 {
        self.points_dropped
    }
}

/// Writes datapoints as Graphite plaintext lines, packed into payloads of bounded size.
///
/// Each datapoint becomes a `<path> <value> <timestamp>\n` line. Lines are never split across payloads, so each payload
/// can be sent on its own. Values that are whole numbers are written without a fractional part, and everything else in
/// the shortest form that reads back to the same value.
///
/// A datapoint is dropped if its value is not finite, or if its line alone would exceed the maximum payload length.
pub struct GraphiteWriter {
    max_payload_len: usize,
    payloads_buf: Vec<u8>,
    offsets: Vec<usize>,
    line_buf: Vec<u8>,
}

impl GraphiteWriter {
    /// Creates a new `GraphiteWriter` with the given maximum payload length.
    ///
    /// # Panics
    ///
    /// Panics if the maximum payload length is too small to hold even the shortest line.
    pub fn new(max_payload_len: usize) -> Self {
        assert!(
            max_payload_len >= SMALLEST_VALID_PAYLOAD.len(),
            "maximum payload length is too small to allow any datapoints to be written (must be {} or greater)",
            SMALLEST_VALID_PAYLOAD.len()
        );

        Self { max_payload_len, payloads_buf: Vec::new(), offsets: Vec::new(), line_buf: Vec::new() }
    }

    fn last_offset(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn current_payload_len(&self) -> usize {
        self.payloads_buf.len() - self.last_offset()
    }

    fn finalize_current_payload(&mut self) {
        if self.current_payload_len() == 0 {
            return;
        }

        self.offsets.push(self.payloads_buf.len());
    }

    /// Commits the pending line to the current payload, starting a new payload first if it wouldn't fit.
    ///
    /// Returns `false` if the line is longer than the maximum payload length, in which case it is discarded.
    fn commit(&mut self) -> bool {
        let line_len = self.line_buf.len();
        if line_len > self.max_payload_len {
            self.line_buf.clear();
            return false;
        }

        if self.current_payload_len() + line_len > self.max_payload_len {
            self.finalize_current_payload();
        }

        self.payloads_buf.extend_from_slice(&self.line_buf);
        self.line_buf.clear();
        true
    }

    /// Writes a single datapoint.
    pub fn write(&mut self, datapoint: &Datapoint) -> WriteResult {
        let mut formatter = ValueFormatter::new();
        let Some(value) = formatter.format(datapoint.value) else {
            return WriteResult::failure();
        };

        let mut int_writer = itoa::Buffer::new();
        let timestamp = int_writer.format(datapoint.timestamp);

        self.line_buf.clear();
        self.line_buf.extend_from_slice(datapoint.path.as_bytes());
        self.line_buf.push(b' ');
        self.line_buf.extend_from_slice(value.as_bytes());
        self.line_buf.push(b' ');
        self.line_buf.extend_from_slice(timestamp.as_bytes());
        self.line_buf.push(b'\n');

        if self.commit() {
            WriteResult::success()
        } else {
            WriteResult::failure()
        }
    }

    /// Writes every datapoint, in order.
    pub fn write_all<'a, I>(&mut self, datapoints: I) -> WriteResult
    where
        I: IntoIterator<Item = &'a Datapoint>,
    {
        let mut result = WriteResult::default();
        for datapoint in datapoints {
            result.merge(self.write(datapoint));
        }
        result
    }

    /// Returns a consuming iterator over all payloads written so far.
    ///
    /// Payloads are yielded in the order they were written, and are cleared from the writer when the iterator is
    /// dropped.
    pub fn payloads(&mut self) -> Payloads<'_> {
        self.finalize_current_payload();
        self.line_buf.clear();

        Payloads::new(&mut self.payloads_buf, &mut self.offsets)
    }
}

/// Iterator over all payloads written by a [`GraphiteWriter`].
pub struct Payloads<'a> {
    payloads_buf: ConsumingBufferSwap<'a, u8>,
    start: usize,
    offsets: Drain<'a, usize>,
}

impl<'a> Payloads<'a> {
    fn new(payloads_buf: &'a mut Vec<u8>, offsets: &'a mut Vec<usize>) -> Self {
        Self { payloads_buf: ConsumingBufferSwap::new(payloads_buf), start: 0, offsets: offsets.drain(..) }
    }

    /// Returns the number of remaining payloads.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if there are no remaining payloads.
    pub fn is_empty(&self) -> bool {
        self.offsets.len() == 0
    }

    /// Returns the next payload, or `None` if there are no more.
    pub fn next_payload(&mut self) -> Option<&[u8]> {
        let offset = self.offsets.next()?;

        let payload = &self.payloads_buf[self.start..offset];
        self.start = offset;

        Some(payload)
    }
}

// Empties the source buffer up front, and hands the allocation back, cleared, on drop. Even if the drop never runs,
// the source is left empty rather than half-consumed.
struct ConsumingBufferSwap<'a, T> {
    source: &'a mut Vec<T>,
    original: Vec<T>,
}

impl<'a, T> ConsumingBufferSwap<'a, T> {
    fn new(source: &'a mut Vec<T>) -> Self {
        let original = std::mem::take(source);
        Self { source, original }
    }
}

impl<T> Drop for ConsumingBufferSwap<'_, T> {
    fn drop(&mut self) {
        self.original.clear();
        std::mem::swap(self.source, &mut self.original);
    }
}

impl<T> Deref for ConsumingBufferSwap<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.original
    }
}

impl<T> DerefMut for ConsumingBufferSwap<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.original
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec as arb_vec, prelude::*, proptest};

    use super::{GraphiteWriter, SMALLEST_VALID_PAYLOAD};
    use crate::reporter::Datapoint;

    const SMALLEST_VALID_PAYLOAD_LEN: usize = SMALLEST_VALID_PAYLOAD.len();

    fn payloads_from_writer(writer: &mut GraphiteWriter) -> Vec<String> {
        let mut payloads = writer.payloads();
        let mut out = Vec::new();
        while let Some(payload) = payloads.next_payload() {
            out.push(String::from_utf8(payload.to_vec()).unwrap());
        }
        out
    }

    #[test]
    fn lines() {
        // Cases are defined as: path, value, timestamp, expected output.
        let cases = [
            ("stats.gorets", 1.7, 1_300_000_000, "stats.gorets 1.7 1300000000\n"),
            ("stats_counts.gorets", 17.0, 1_300_000_000, "stats_counts.gorets 17 1300000000\n"),
            ("statsd.numStats", 0.0, 0, "statsd.numStats 0 0\n"),
            ("stats.gauge.temp.value", -3.0, 1, "stats.gauge.temp.value -3 1\n"),
            ("stats.timers.glork.stddev", 13.490738, 1, "stats.timers.glork.stddev 13.490738 1\n"),
            ("big", 1e20, 1, "big 1e20 1\n"),
            ("small", 1e-7, 1, "small 1e-7 1\n"),
        ];

        for (path, value, timestamp, expected) in cases {
            let mut writer = GraphiteWriter::new(8192);
            let result = writer.write(&Datapoint::new(path, value, timestamp));
            assert_eq!(result.points_written(), 1);
            assert!(!result.any_failures());
            assert_eq!(payloads_from_writer(&mut writer), vec![expected.to_string()]);
        }
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let mut writer = GraphiteWriter::new(8192);
        let datapoints = [
            Datapoint::new("nan", f64::NAN, 1),
            Datapoint::new("ok", 1.0, 1),
            Datapoint::new("inf", f64::INFINITY, 1),
        ];

        let result = writer.write_all(&datapoints);
        assert_eq!(result.points_written(), 1);
        assert_eq!(result.points_dropped(), 2);
        assert_eq!(payloads_from_writer(&mut writer), vec!["ok 1 1\n".to_string()]);
    }

    #[test]
    fn payload_splitting() {
        // Each line is exactly 11 bytes.
        let datapoints = (0..5).map(|i| Datapoint::new(format!("m.{}", i), 10.0, 100)).collect::<Vec<_>>();

        let mut writer = GraphiteWriter::new(25);
        let result = writer.write_all(&datapoints);
        assert_eq!(result.points_written(), 5);

        assert_eq!(
            payloads_from_writer(&mut writer),
            vec![
                "m.0 10 100\nm.1 10 100\n".to_string(),
                "m.2 10 100\nm.3 10 100\n".to_string(),
                "m.4 10 100\n".to_string(),
            ]
        );
    }

    #[test]
    fn oversized_lines_are_dropped() {
        let mut writer = GraphiteWriter::new(16);
        let result = writer.write_all(&[
            Datapoint::new("short", 1.0, 1),
            Datapoint::new("a.very.long.metric.path", 1.0, 1),
            Datapoint::new("tiny", 2.0, 1),
        ]);

        assert_eq!(result.points_written(), 2);
        assert_eq!(result.points_dropped(), 1);
        assert_eq!(payloads_from_writer(&mut writer), vec!["short 1 1\n".to_string(), "tiny 2 1\n".to_string()]);
    }

    #[test]
    fn payloads_are_consumed() {
        let mut writer = GraphiteWriter::new(8192);
        writer.write(&Datapoint::new("a", 1.0, 1));
        assert_eq!(writer.payloads().len(), 1);

        // Consumed even though the iterator was never advanced.
        assert!(writer.payloads().is_empty());

        writer.write(&Datapoint::new("b", 2.0, 2));
        assert_eq!(payloads_from_writer(&mut writer), vec!["b 2 2\n".to_string()]);
    }

    #[test]
    #[should_panic]
    fn payload_length_too_small() {
        let _ = GraphiteWriter::new(SMALLEST_VALID_PAYLOAD_LEN - 1);
    }

    fn arb_datapoint() -> impl Strategy<Value = Datapoint> {
        ("[a-z][a-z0-9._]{0,48}", any::<f64>(), any::<u64>()).prop_map(|(path, value, ts)| Datapoint::new(path, value, ts))
    }

    proptest! {
        #[test]
        fn property_test_gauntlet(payload_limit in SMALLEST_VALID_PAYLOAD_LEN..4096usize, inputs in arb_vec(arb_datapoint(), 1..128)) {
            let mut writer = GraphiteWriter::new(payload_limit);
            let result = writer.write_all(&inputs);
            prop_assert_eq!(result.points_written() + result.points_dropped(), inputs.len() as u64);

            let mut payloads = writer.payloads();
            let mut lines_emitted: u64 = 0;
            while let Some(payload) = payloads.next_payload() {
                prop_assert!(!payload.is_empty());
                prop_assert!(payload.len() <= payload_limit);
                prop_assert_eq!(payload.last(), Some(&b'\n'));

                for line in std::str::from_utf8(payload).unwrap().lines() {
                    lines_emitted += 1;

                    let parts = line.split(' ').collect::<Vec<_>>();
                    prop_assert_eq!(parts.len(), 3);
                    prop_assert!(parts[1].parse::<f64>().unwrap().is_finite());
                    prop_assert!(parts[2].parse::<u64>().is_ok());
                }
            }

            prop_assert_eq!(lines_emitted, result.points_written());
        }
    }
}
