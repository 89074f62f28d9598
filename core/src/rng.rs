//! Deterministic random number generation.
//!
//! RULE: Nothing in the analysis may call any platform RNG.
//! Customer sampling and synthetic histories draw from a `SeededRng`
//! built from an explicit seed, so the same seed always selects the
//! same customers and produces the same panel.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG stream.
pub struct SeededRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SeededRng {
    /// Create a stream from a seed and a stable stream index.
    /// The index must never change once assigned.
    pub fn new(seed: u64, stream: RngStream) -> Self {
        let derived_seed = seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            name: stream.name(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Sample from a simplified Pareto distribution.
    pub fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u = self.next_f64().max(1e-10);
        x_min * u.powf(-1.0 / alpha)
    }

    /// Choose `k` distinct items without replacement (partial Fisher-Yates).
    /// The result keeps the draw order; callers sort if they need to.
    pub fn choose_without_replacement<T: Clone>(&mut self, items: &[T], k: usize) -> Vec<T> {
        let mut pool: Vec<T> = items.to_vec();
        let k = k.min(pool.len());
        for i in 0..k {
            let remaining = (pool.len() - i) as u64;
            let j = i + self.next_u64_below(remaining) as usize;
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }
}

/// Stable stream assignments.
/// NEVER reorder or remove entries; only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngStream {
    CustomerSample = 0,
    SyntheticHistory = 1,
}

impl RngStream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CustomerSample => "customer_sample",
            Self::SyntheticHistory => "synthetic_history",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sample() {
        let items: Vec<u32> = (0..100).collect();
        let a = SeededRng::new(42, RngStream::CustomerSample).choose_without_replacement(&items, 10);
        let b = SeededRng::new(42, RngStream::CustomerSample).choose_without_replacement(&items, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn sample_is_distinct_and_capped() {
        let items: Vec<u32> = (0..5).collect();
        let mut rng = SeededRng::new(7, RngStream::CustomerSample);
        let mut picked = rng.choose_without_replacement(&items, 50);
        assert_eq!(picked.len(), 5);
        picked.sort_unstable();
        assert_eq!(picked, items);
    }

    #[test]
    fn streams_are_independent() {
        let mut a = SeededRng::new(1, RngStream::CustomerSample);
        let mut b = SeededRng::new(1, RngStream::SyntheticHistory);
        assert_ne!(a.next_f64(), b.next_f64());
    }

    #[test]
    fn stream_name_follows_the_stream() {
        assert_eq!(SeededRng::new(1, RngStream::CustomerSample).name, "customer_sample");
        assert_eq!(SeededRng::new(1, RngStream::SyntheticHistory).name, "synthetic_history");
    }
}
