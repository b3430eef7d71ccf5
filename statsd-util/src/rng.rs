use std::cell::RefCell;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

thread_local! {
    static FAST_RNG: RefCell<Xoshiro256StarStar> = RefCell::new(Xoshiro256StarStar::from_rng(&mut rand::rng()));
}

/// Returns a uniformly distributed index in `0..upper`.
pub(crate) fn fastrand(upper: usize) -> usize {
    FAST_RNG.with(|rng| rng.borrow_mut().random_range(0..upper))
}

/// Returns a uniformly distributed value in `(0, 1]`.
///
/// Zero is excluded so the result can safely be used as a divisor.
pub(crate) fn fastrand_unit() -> f64 {
    FAST_RNG.with(|rng| 1.0 - rng.borrow_mut().random::<f64>())
}

/// Runs `f` with the thread-local generator.
pub(crate) fn with_rng<F, T>(f: F) -> T
where
    F: FnOnce(&mut Xoshiro256StarStar) -> T,
{
    FAST_RNG.with(|rng| f(&mut rng.borrow_mut()))
}
