//! Deterministic seeded hashing for minimizer selection.
//!
//! Built on `ahash` with explicit seeds so that the same seed always yields
//! the same hash values, at build time and at query time alike.

use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

/// A deterministic 64-bit hasher derived from a single seed.
#[derive(Clone)]
pub struct SeededHasher {
    seed: u64,
    state: RandomState,
}

impl SeededHasher {
    /// Create a hasher for the given seed.
    pub fn new(seed: u64) -> Self {
        let state = RandomState::with_seeds(seed, !seed, seed.rotate_left(32), !seed.rotate_left(32));
        Self { seed, state }
    }

    /// Hash a `u64` value.
    #[inline]
    pub fn hash_u64(&self, value: u64) -> u64 {
        let mut hasher = self.state.build_hasher();
        hasher.write_u64(value);
        hasher.finish()
    }

    /// The seed this hasher was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_hash() {
        let a = SeededHasher::new(42);
        let b = SeededHasher::new(42);
        let v = 0x0123_4567_89ab_cdefu64;
        assert_eq!(a.hash_u64(v), b.hash_u64(v));
    }

    #[test]
    fn different_seed_different_hash() {
        let a = SeededHasher::new(1);
        let b = SeededHasher::new(2);
        assert_ne!(a.hash_u64(100), b.hash_u64(100));
    }

    #[test]
    fn different_values_different_hashes() {
        let h = SeededHasher::new(1);
        assert_ne!(h.hash_u64(100), h.hash_u64(101));
    }
}
