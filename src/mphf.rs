//! Minimal perfect hashing.
//!
//! Uses PHast ("Perfect Hashing made fast") from the `ph` crate with an
//! `ahash`-based seeded hasher instead of the default SipHash: faster to
//! evaluate, below 2 bits per key, and deterministic, which serialization
//! round-trips require.
//!
//! Two consumers: the map from distinct minimizers to bucket ids
//! ([`Minimizers`]) and the per-partition functions of the skew index.

use crate::error::Result;
use std::io;

use ph::phast;
use ph::seeds::Bits8;
use ph::Seedable;

/// The seeded hasher used inside the MPHFs. Fixed seeds keep the function
/// deterministic across build and load.
pub type MphfHasher = Seedable<ahash::RandomState>;

/// Concrete MPHF type: PHast with 8-bit seeds and the ahash hasher.
pub type Mphf = phast::Function<Bits8, phast::SeedOnly, phast::DefaultCompressedArray, MphfHasher>;

/// The deterministic MPHF hasher. Must be identical at build and load time.
pub fn mphf_hasher() -> MphfHasher {
    Seedable(ahash::RandomState::with_seeds(0, 0, 0, 0))
}

/// PHast parameters: 8 bits per seed, matching bucket size.
pub fn mphf_params() -> phast::Params<Bits8> {
    phast::Params::new(Bits8, phast::bits_per_seed_to_100_bucket_size(8))
}

/// Number of construction threads: `min(available, requested)`, where a
/// `requested` of 0 selects the default of 8 threads on machines with at
/// least 8 hardware threads and 1 otherwise.
pub fn mphf_threads(requested: usize) -> usize {
    let hw = std::thread::available_parallelism().map_or(1, |n| n.get());
    let requested = if requested == 0 {
        if hw >= 8 {
            8
        } else {
            1
        }
    } else {
        requested
    };
    requested.min(hw).max(1)
}

/// Build an MPHF over `keys` with a bounded thread pool.
pub fn build_mphf(keys: &[u64], threads: usize) -> Mphf {
    Mphf::with_slice_p_threads_hash_sc(keys, &mphf_params(), threads, mphf_hasher(), phast::SeedOnly)
}

/// Deserialize an MPHF, re-attaching the deterministic hasher.
pub fn read_mphf(reader: &mut dyn io::Read) -> io::Result<Mphf> {
    Mphf::read_with_hasher_sc(reader, mphf_hasher(), phast::SeedOnly)
}

/// Minimal perfect hash over the distinct minimizers: bucket routing.
///
/// For a minimizer in the build set, `lookup` returns its unique bucket id in
/// `[0, num_keys)`. For a foreign minimizer it may return an arbitrary bucket
/// (whose candidates then fail exact comparison downstream) or `None`.
pub struct Minimizers {
    /// `None` only for an index over zero k-mers.
    mphf: Option<Mphf>,
    num_keys: u64,
}

impl Minimizers {
    /// Build over the given distinct minimizer values.
    pub fn build(keys: &[u64], threads: usize) -> Result<Self> {
        Ok(Self {
            mphf: (!keys.is_empty()).then(|| build_mphf(keys, threads)),
            num_keys: keys.len() as u64,
        })
    }

    /// Reassemble from deserialized parts.
    pub(crate) fn from_parts(mphf: Option<Mphf>, num_keys: u64) -> Self {
        Self { mphf, num_keys }
    }

    /// Bucket id for a minimizer, or `None` when the hash falls out of range.
    #[inline]
    pub fn lookup(&self, minimizer: u64) -> Option<u64> {
        let id = self.mphf.as_ref()?.get(&minimizer) as u64;
        (id < self.num_keys).then_some(id)
    }

    /// Number of distinct minimizers.
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Serialized size of the underlying MPHF, in bytes.
    pub fn serialized_bytes(&self) -> usize {
        self.mphf.as_ref().map_or(0, |m| m.write_bytes())
    }

    /// Access to the underlying MPHF for serialization.
    pub(crate) fn mphf(&self) -> Option<&Mphf> {
        self.mphf.as_ref()
    }
}
