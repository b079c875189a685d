//! Error types for dictionary construction and serialization.
//!
//! Queries never fail: `lookup` on an absent key returns the sentinel
//! [`INVALID_UINT64`](crate::constants::INVALID_UINT64) instead of an error.

use thiserror::Error;

/// Errors raised by dictionary construction, input parsing and (de)serialization.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid build configuration (detected before any work begins).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Underlying I/O failure while reading input or an index file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed input: unreadable record or a non-ACGT base in a sequence.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `k - m + 1` exceeds the width of the per-string k-mer counter.
    #[error("{max_kmers_in_string} k-mers per string does not fit into {bits} bits")]
    Width {
        /// The value of `k - m + 1` for the offending configuration.
        max_kmers_in_string: u64,
        /// Width of the counter field, in bits.
        bits: u32,
    },

    /// A skew-index size class received no k-mers.
    #[error(
        "empty skew-index partition for bucket sizes in ({lower}, {upper}]: \
         try a different choice of l or change the seed"
    )]
    EmptyPartition {
        /// Exclusive lower bound of the empty size class.
        lower: u64,
        /// Inclusive upper bound of the empty size class.
        upper: u64,
    },

    /// Corrupt or incompatible serialized index.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
