//! Sampled histograms with exact running aggregates.
use std::sync::Arc;

use crate::{
    clock::Clock,
    sample::{Reservoir, Sample},
};

/// A histogram over a bounded sample.
///
/// The count, sum, minimum, maximum and variance are exact over every value recorded since the last clear. Only the
/// percentiles are approximate, as they are computed from whatever the underlying [`Sample`] retained.
///
/// Variance is tracked with [Welford's online algorithm][welford], which stays numerically stable over long streams
/// where the naive sum-of-squares approach loses precision.
///
/// A histogram with no recorded values reports `0.0` for every statistic.
///
/// [welford]: https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Welford's_online_algorithm
#[derive(Debug)]
pub struct Histogram<S = Reservoir> {
    sample: S,
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    // Welford's running (M, S) pair.
    variance: Option<(f64, f64)>,
}

impl Histogram<Reservoir> {
    /// Creates a histogram over a uniform sample of the default size.
    pub fn uniform() -> Self {
        Histogram::new(Reservoir::uniform())
    }

    /// Creates a histogram over an exponentially decaying sample of the default size and decay factor.
    pub fn exponentially_decaying(clock: Arc<dyn Clock>) -> Self {
        Histogram::new(Reservoir::exponentially_decaying(clock))
    }
}

impl<S: Sample> Histogram<S> {
    /// Creates a new `Histogram` over the given sample.
    pub fn new(sample: S) -> Self {
        Histogram { sample, count: 0, sum: 0.0, min: None, max: None, variance: None }
    }

    /// Records a single value.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        self.sample.update(value);
        self.sum += value;

        match self.min {
            Some(min) if min <= value => {}
            _ => self.min = Some(value),
        }
        match self.max {
            Some(max) if max >= value => {}
            _ => self.max = Some(value),
        }

        self.variance = Some(match self.variance {
            None => (value, 0.0),
            Some((old_m, old_s)) => {
                let new_m = old_m + (value - old_m) / self.count as f64;
                let new_s = old_s + (value - old_m) * (value - new_m);
                (new_m, new_s)
            }
        });
    }

    /// Removes every recorded value, including those held by the sample.
    pub fn clear(&mut self) {
        self.sample.clear();
        self.count = 0;
        self.sum = 0.0;
        self.min = None;
        self.max = None;
        self.variance = None;
    }

    /// Gets the number of recorded values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Gets the sum of all recorded values.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Gets the smallest recorded value.
    pub fn min(&self) -> f64 {
        self.min.unwrap_or(0.0)
    }

    /// Gets the largest recorded value.
    pub fn max(&self) -> f64 {
        self.max.unwrap_or(0.0)
    }

    /// Gets the arithmetic mean of all recorded values.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Gets the sample variance of all recorded values.
    pub fn variance(&self) -> f64 {
        match self.variance {
            Some((_, s)) if self.count > 1 => s / (self.count - 1) as f64,
            _ => 0.0,
        }
    }

    /// Gets the standard deviation of all recorded values.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Gets the values held by the underlying sample.
    pub fn values(&self) -> Vec<f64> {
        self.sample.values()
    }

    /// Gets a reference to the underlying sample.
    pub fn sample(&self) -> &S {
        &self.sample
    }

    /// Gets the values at the given percentiles, each expressed as a quantile between 0.0 and 1.0.
    ///
    /// The sampled values are sorted and, for `p` over `n` values, the rank `p * (n + 1)` is linearly interpolated
    /// between its two neighbors. Ranks falling before the first or after the last value are clamped to them. A NaN
    /// percentile has no rank, and its value is NaN.
    pub fn percentiles(&self, percentiles: &[f64]) -> Vec<f64> {
        let mut scores = vec![0.0; percentiles.len()];
        if self.count == 0 {
            return scores;
        }

        let mut values = self.sample.values();
        if values.is_empty() {
            return scores;
        }
        values.sort_unstable_by(f64::total_cmp);

        let len = values.len();
        for (score, p) in scores.iter_mut().zip(percentiles) {
            if p.is_nan() {
                *score = f64::NAN;
                continue;
            }

            let pos = p * (len + 1) as f64;
            *score = if pos < 1.0 {
                values[0]
            } else if pos >= len as f64 {
                values[len - 1]
            } else {
                let idx = pos.floor() as usize;
                let lower = values[idx - 1];
                let upper = values[idx];
                lower + (pos - pos.floor()) * (upper - lower)
            };
        }

        scores
    }
}
