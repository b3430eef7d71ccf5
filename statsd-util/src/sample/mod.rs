//! Bounded samples of unbounded streams.
//!
//! [Reservoir sampling][rs] keeps a statistically representative sample of a data stream in fixed space, without
//! knowing the length of the stream in advance. Two flavors are provided:
//!
//! - [`UniformSample`]: every value ever seen has the same chance of being in the sample.
//! - [`ExponentiallyDecayingSample`]: the sample is biased towards recent values.
//!
//! [rs]: https://en.wikipedia.org/wiki/Reservoir_sampling
use std::sync::Arc;

use crate::clock::Clock;

mod decaying;
pub use self::decaying::{ExponentiallyDecayingSample, RESCALE_THRESHOLD};

mod uniform;
pub use self::uniform::UniformSample;

/// Default reservoir size.
///
/// 1028 elements offer a 99.9% confidence level with a 5% margin of error, assuming a normal distribution.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// Default decay factor for [`ExponentiallyDecayingSample`], which heavily biases the sample towards the last five
/// minutes of values.
pub const DEFAULT_ALPHA: f64 = 0.015;

/// A bounded sample of a stream of values.
pub trait Sample {
    /// Adds a value to the sample.
    fn update(&mut self, value: f64);

    /// Returns the values currently held in the sample, in no particular order.
    fn values(&self) -> Vec<f64>;

    /// Returns the number of values currently held in the sample.
    fn size(&self) -> usize;

    /// Removes every value from the sample.
    fn clear(&mut self);
}

/// A sample whose flavor is picked at runtime.
#[derive(Debug)]
pub enum Reservoir {
    /// Uniform sampling over every value seen since the last clear.
    Uniform(UniformSample),

    /// Forward-decaying sampling biased towards recent values.
    Decaying(ExponentiallyDecayingSample),
}

impl Reservoir {
    /// Creates a uniform reservoir of the default size.
    pub fn uniform() -> Self {
        Reservoir::Uniform(UniformSample::new(DEFAULT_RESERVOIR_SIZE))
    }

    /// Creates an exponentially decaying reservoir of the default size and decay factor.
    pub fn exponentially_decaying(clock: Arc<dyn Clock>) -> Self {
        Reservoir::Decaying(ExponentiallyDecayingSample::new(
            DEFAULT_RESERVOIR_SIZE,
            DEFAULT_ALPHA,
            clock,
        ))
    }
}

impl Sample for Reservoir {
    fn update(&mut self, value: f64) {
        match self {
            Reservoir::Uniform(sample) => sample.update(value),
            Reservoir::Decaying(sample) => sample.update(value),
        }
    }

    fn values(&self) -> Vec<f64> {
        match self {
            Reservoir::Uniform(sample) => sample.values(),
            Reservoir::Decaying(sample) => sample.values(),
        }
    }

    fn size(&self) -> usize {
        match self {
            Reservoir::Uniform(sample) => sample.size(),
            Reservoir::Decaying(sample) => sample.size(),
        }
    }

    fn clear(&mut self) {
        match self {
            Reservoir::Uniform(sample) => sample.clear(),
            Reservoir::Decaying(sample) => sample.clear(),
        }
    }
}
