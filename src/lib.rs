// minidict: a compact k-mer dictionary.
//
// Super-k-mer string pool + minimizer MPHF routing + skew index for
// crowded buckets, after the SSHash index layout.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod buckets;
pub mod builder;
pub mod constants;
pub mod dictionary;
pub mod ef;
pub mod error;
pub mod hasher;
pub mod kmer;
pub mod mphf;
pub mod pool;
pub mod serialization;
pub mod skew_index;

pub use builder::{BuildConfiguration, DictionaryBuilder};
pub use constants::INVALID_UINT64;
pub use dictionary::{Dictionary, KmerIterator};
pub use error::{Error, Result};
