//! Streaming statistics primitives used by the statsd aggregation engine.
//!
//! Everything in this crate is single-writer: types take `&mut self` for updates and are expected to be owned by one
//! logical execution context, typically the message processor in `statsd-aggregator`.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

pub mod clock;
pub use clock::{Clock, MockClock, SystemClock};

mod distinct;
pub use distinct::{trailing_zeros, SBoxHash, SlidingDistinctCounter};

mod ewma;
pub use ewma::Ewma;

mod histogram;
pub use histogram::Histogram;

mod quantile;
pub use quantile::{parse_quantiles, Quantile};

mod rng;

pub mod sample;
pub use sample::{ExponentiallyDecayingSample, Reservoir, Sample, UniformSample};
