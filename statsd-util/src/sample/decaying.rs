use std::{cmp::Ordering, cmp::Reverse, collections::BinaryHeap, fmt, sync::Arc};

use super::Sample;
use crate::{clock::Clock, rng::fastrand_unit};

/// How often, in seconds, the landmark of an [`ExponentiallyDecayingSample`] is moved forward.
pub const RESCALE_THRESHOLD: f64 = 60.0 * 60.0;

#[derive(Clone, Copy, Debug)]
struct WeightedValue {
    priority: f64,
    value: f64,
}

impl PartialEq for WeightedValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WeightedValue {}

impl PartialOrd for WeightedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WeightedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// An exponentially-decaying random sample of values.
///
/// Uses Cormode et al's [forward-decaying priority reservoir sampling][fwd] to produce a statistically representative
/// sample, exponentially biased towards newer values. Each value gets a priority of `exp(alpha * (t - L)) / u`, where
/// `L` is the current landmark and `u` is uniformly distributed over `(0, 1]`, and only the `capacity`
/// highest-priority values are kept.
///
/// Priorities grow exponentially with the distance from the landmark, so the landmark is moved forward every
/// [`RESCALE_THRESHOLD`] seconds and every stored priority is multiplied by `exp(-alpha * (L' - L))`. The relative
/// order of priorities is unaffected, and their magnitude stays bounded no matter how long the sample lives.
///
/// [fwd]: http://dimacs.rutgers.edu/~graham/pubs/papers/fwddecay.pdf
pub struct ExponentiallyDecayingSample {
    values: BinaryHeap<Reverse<WeightedValue>>,
    capacity: usize,
    alpha: f64,
    count: usize,
    start_time: f64,
    next_scale_time: f64,
    clock: Arc<dyn Clock>,
}

impl ExponentiallyDecayingSample {
    /// Creates a new `ExponentiallyDecayingSample`.
    ///
    /// `alpha` is the decay factor: the higher it is, the more the sample is biased towards newer values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, alpha: f64, clock: Arc<dyn Clock>) -> Self {
        assert!(capacity > 0, "reservoir capacity must be greater than zero");

        let now = clock.now();
        Self {
            values: BinaryHeap::with_capacity(capacity),
            capacity,
            alpha,
            count: 0,
            start_time: now,
            next_scale_time: now + RESCALE_THRESHOLD,
            clock,
        }
    }

    /// Returns the number of values pushed since the last clear.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Adds a value observed at `timestamp`, in seconds since the UNIX epoch.
    pub fn update_at(&mut self, value: f64, timestamp: f64) {
        if timestamp >= self.next_scale_time {
            self.rescale(timestamp);
        }

        let priority = (self.alpha * (timestamp - self.start_time)).exp() / fastrand_unit();
        let weighted = WeightedValue { priority, value };

        self.count += 1;
        if self.values.len() < self.capacity {
            self.values.push(Reverse(weighted));
        } else if let Some(Reverse(lowest)) = self.values.peek() {
            if lowest.priority < priority {
                self.values.pop();
                self.values.push(Reverse(weighted));
            }
        }
    }

    /// Moves the landmark to `now`, scaling every stored priority accordingly.
    fn rescale(&mut self, now: f64) {
        let old_start_time = self.start_time;
        self.start_time = now;
        self.next_scale_time = now + RESCALE_THRESHOLD;

        let factor = (-self.alpha * (self.start_time - old_start_time)).exp();
        let values = std::mem::take(&mut self.values);
        self.values = values
            .into_iter()
            .map(|Reverse(weighted)| {
                Reverse(WeightedValue { priority: weighted.priority * factor, value: weighted.value })
            })
            .collect();
    }
}

impl Sample for ExponentiallyDecayingSample {
    fn update(&mut self, value: f64) {
        let now = self.clock.now();
        self.update_at(value, now);
    }

    fn values(&self) -> Vec<f64> {
        self.values.iter().map(|Reverse(weighted)| weighted.value).collect()
    }

    fn size(&self) -> usize {
        self.values.len()
    }

    fn clear(&mut self) {
        self.values.clear();
        self.count = 0;
        self.start_time = self.clock.now();
        self.next_scale_time = self.start_time + RESCALE_THRESHOLD;
    }
}

impl fmt::Debug for ExponentiallyDecayingSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExponentiallyDecayingSample")
            .field("capacity", &self.capacity)
            .field("alpha", &self.alpha)
            .field("count", &self.count)
            .field("size", &self.values.len())
            .field("start_time", &self.start_time)
            .finish()
    }
}
