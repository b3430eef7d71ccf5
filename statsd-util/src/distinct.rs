//! Probabilistic distinct counting over sliding windows of time.
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::rng::with_rng;

/// Flajolet-Martin bias correction constant.
const PHI: f64 = 0.77351;

/// A fast, randomly-seeded hash function based on a substitution box.
///
/// Every instance draws its own table of 256 random 32-bit words, so two instances hash the same input
/// independently. This is exactly what the distinct counter needs, and exactly what makes it unsuitable for anything
/// that needs a stable or cryptographically strong hash.
#[derive(Clone)]
pub struct SBoxHash {
    table: [u32; 256],
}

impl SBoxHash {
    /// Creates a new `SBoxHash` with a table drawn from the thread-local generator.
    pub fn new() -> Self {
        with_rng(|rng| Self::from_rng(rng))
    }

    /// Creates a new `SBoxHash` with a table derived from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(&mut Xoshiro256StarStar::seed_from_u64(seed))
    }

    fn from_rng<R: Rng>(rng: &mut R) -> Self {
        let mut table = [0u32; 256];
        for word in table.iter_mut() {
            *word = rng.random_range(0..u32::MAX);
        }
        Self { table }
    }

    /// Hashes `data`.
    pub fn hash(&self, data: &[u8]) -> u32 {
        data.iter().fold(0u32, |value, b| (value ^ self.table[usize::from(*b)]).wrapping_mul(3))
    }
}

impl Default for SBoxHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts the zero bits below the lowest set bit of `n`.
///
/// Zero has no set bit and counts as zero.
pub fn trailing_zeros(n: u32) -> u32 {
    if n == 0 {
        0
    } else {
        n.trailing_zeros()
    }
}

/// A probabilistic distinct counter with sliding windows.
///
/// This is [Flajolet-Martin][fm] probabilistic counting, averaged over `n_hashes` independent hash functions, where
/// each bitmap bit is replaced by the timestamp of the last item that set it. An item sets, for every hash function
/// `i`, the bucket `min(n_buckets - 1, trailing_zeros(hash_i(item)))`. Counting only the buckets touched after a
/// given instant turns the same state into an estimate for any trailing window, and memory stays at
/// `n_hashes * n_buckets` timestamps no matter how many items are seen.
///
/// [fm]: https://algo.inria.fr/flajolet/Publications/FlMa85.pdf
pub struct SlidingDistinctCounter {
    n_buckets: usize,
    hashes: Vec<SBoxHash>,
    buckets: Vec<Vec<f64>>,
}

impl SlidingDistinctCounter {
    /// Creates a new `SlidingDistinctCounter` with `n_hashes` hash functions of `n_buckets` buckets each.
    ///
    /// # Panics
    ///
    /// Panics if either `n_hashes` or `n_buckets` is zero.
    pub fn new(n_hashes: usize, n_buckets: usize) -> Self {
        Self::with_hashes((0..n_hashes).map(|_| SBoxHash::new()).collect(), n_buckets)
    }

    /// Creates a new `SlidingDistinctCounter` whose hash functions are derived from `seed`.
    pub fn with_seed(n_hashes: usize, n_buckets: usize, seed: u64) -> Self {
        let hashes = (0..n_hashes as u64)
            .map(|i| SBoxHash::with_seed(seed.wrapping_add(i)))
            .collect();
        Self::with_hashes(hashes, n_buckets)
    }

    fn with_hashes(hashes: Vec<SBoxHash>, n_buckets: usize) -> Self {
        assert!(!hashes.is_empty(), "distinct counter needs at least one hash function");
        assert!(n_buckets > 0, "distinct counter needs at least one bucket");

        let buckets = vec![vec![0.0; n_buckets]; hashes.len()];
        Self { n_buckets, hashes, buckets }
    }

    /// Records `item` as seen at `when`, in seconds since the UNIX epoch.
    pub fn add(&mut self, when: f64, item: &[u8]) {
        let last_bucket = self.n_buckets - 1;
        for (hash, row) in self.hashes.iter().zip(self.buckets.iter_mut()) {
            let zeros = trailing_zeros(hash.hash(item)) as usize;
            row[zeros.min(last_bucket)] = when;
        }
    }

    /// Estimates the number of distinct items seen strictly after `since`.
    pub fn distinct(&self, since: f64) -> u64 {
        let total: usize = self
            .buckets
            .iter()
            .map(|row| row.iter().take_while(|when| **when > since).count())
            .sum();

        let v = total as f64 / self.hashes.len() as f64;
        (v.exp2() / PHI).round() as u64
    }
}
