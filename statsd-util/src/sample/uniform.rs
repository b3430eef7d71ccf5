use super::Sample;
use crate::rng::fastrand;

/// A uniform sampling reservoir.
///
/// Based on Vitter's ["Algorithm R"][vitter_paper]: the first `capacity` values fill the reservoir, and the `i`-th
/// value after that replaces a random slot with probability `capacity / i`. The result is a sample whose marginal
/// distribution is uniform over every value pushed since the last clear.
///
/// [vitter_paper]: https://www.cs.umd.edu/~samir/498/vitter.pdf
#[derive(Debug, Clone)]
pub struct UniformSample {
    values: Vec<f64>,
    capacity: usize,
    count: usize,
}

impl UniformSample {
    /// Creates a new `UniformSample` that stores up to `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "reservoir capacity must be greater than zero");
        Self { values: Vec::with_capacity(capacity), capacity, count: 0 }
    }

    /// Returns the number of values pushed since the last clear.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns the ratio of held values to pushed values.
    ///
    /// When the reservoir has not been filled, the sample rate is 1.0.
    pub fn sample_rate(&self) -> f64 {
        if self.count <= self.capacity {
            1.0
        } else {
            self.capacity as f64 / self.count as f64
        }
    }
}

impl Sample for UniformSample {
    fn update(&mut self, value: f64) {
        self.count += 1;
        if self.count <= self.capacity {
            self.values.push(value);
        } else {
            let idx = fastrand(self.count);
            if idx < self.capacity {
                self.values[idx] = value;
            }
        }
    }

    fn values(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn size(&self) -> usize {
        self.values.len()
    }

    fn clear(&mut self) {
        self.values.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{Sample, UniformSample};

    #[test]
    fn fills_up_to_capacity() {
        let mut sample = UniformSample::new(100);
        for i in 0..10 {
            sample.update(f64::from(i));
        }

        assert_eq!(sample.size(), 10);
        assert_eq!(sample.values(), (0..10).map(f64::from).collect::<Vec<_>>());
        assert_eq!(sample.sample_rate(), 1.0);
    }

    #[test]
    fn bounded_by_capacity() {
        let mut sample = UniformSample::new(100);
        for i in 0..1000 {
            sample.update(f64::from(i));
        }

        assert_eq!(sample.size(), 100);
        assert_eq!(sample.count(), 1000);
        assert_eq!(sample.sample_rate(), 0.1);
        for value in sample.values() {
            assert!((0.0..1000.0).contains(&value));
            assert_eq!(value.fract(), 0.0);
        }
    }

    #[test]
    fn replaces_values_past_capacity() {
        // With 10,000 values over a 100 slot reservoir, the odds of every original value surviving are nil.
        let mut sample = UniformSample::new(100);
        for i in 0..10_000 {
            sample.update(f64::from(i));
        }

        assert!(sample.values().iter().any(|v| *v >= 100.0));
    }

    #[test]
    fn clear_resets() {
        let mut sample = UniformSample::new(4);
        for i in 0..8 {
            sample.update(f64::from(i));
        }
        sample.clear();

        assert_eq!(sample.size(), 0);
        assert_eq!(sample.count(), 0);
        assert!(sample.values().is_empty());

        sample.update(3.0);
        assert_eq!(sample.values(), vec![3.0]);
    }
}
