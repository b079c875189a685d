//! Build configuration.

use crate::constants::{DEFAULT_C, DEFAULT_L, DEFAULT_SEED, MAX_K, MAX_L};
use crate::error::{Error, Result};

/// Parameters controlling dictionary construction.
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// K-mer length, `1 <= k <= 32`.
    pub k: usize,

    /// Minimizer length, `1 <= m <= k`.
    pub m: usize,

    /// Seed for the minimizer hash.
    pub seed: u64,

    /// Skew-index split threshold exponent: buckets with more than `2^l`
    /// super-k-mers are indexed by the skew index.
    pub l: usize,

    /// MPHF space/time tuning constant. Kept for interface parity; the PHast
    /// functions used here are not parameterized by it.
    pub c: f64,

    /// Treat a k-mer and its reverse complement as equivalent, both when
    /// selecting minimizers during parsing and when matching at lookup.
    pub canonical_parsing: bool,

    /// Optional cap on the total number of indexed k-mers (testing aid).
    pub max_num_kmers: Option<u64>,

    /// Threads for MPHF construction; 0 selects the default policy
    /// (8 when at least 8 hardware threads are available, otherwise 1).
    pub num_threads: usize,

    /// Emit construction statistics.
    pub verbose: bool,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            k: 31,
            m: 13,
            seed: DEFAULT_SEED,
            l: DEFAULT_L,
            c: DEFAULT_C,
            canonical_parsing: false,
            max_num_kmers: None,
            num_threads: 0,
            verbose: false,
        }
    }
}

impl BuildConfiguration {
    /// A validated configuration for the given k-mer and minimizer lengths.
    pub fn new(k: usize, m: usize) -> Result<Self> {
        let config = Self {
            k,
            m,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check all parameter constraints. Called before any work begins.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::Config("k must be > 0".into()));
        }
        if self.k > MAX_K {
            return Err(Error::Config(format!("k must be <= {MAX_K}, got k={}", self.k)));
        }
        if self.m == 0 {
            return Err(Error::Config("m must be > 0".into()));
        }
        if self.m > self.k {
            return Err(Error::Config(format!(
                "m must be <= k, got m={}, k={}",
                self.m, self.k
            )));
        }
        if self.l > MAX_L {
            return Err(Error::Config(format!("l must be <= {MAX_L}, got l={}", self.l)));
        }
        if !self.c.is_finite() || self.c <= 0.0 {
            return Err(Error::Config(format!("c must be positive, got c={}", self.c)));
        }
        Ok(())
    }

    /// Log the configuration via tracing.
    pub fn print(&self) {
        tracing::info!("build configuration: k={} m={} canonical={}", self.k, self.m, self.canonical_parsing);
        tracing::debug!("  seed = {}", self.seed);
        tracing::debug!("  l = {}", self.l);
        tracing::debug!("  c = {}", self.c);
        tracing::debug!("  num_threads = {}", self.num_threads);
        if let Some(cap) = self.max_num_kmers {
            tracing::debug!("  max_num_kmers = {cap}");
        }
    }
}
