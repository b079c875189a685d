//! Dictionary construction.
//!
//! The build is a strict pipeline, each stage observing the complete output
//! of the previous one:
//!
//! 1. parse input into the string pool and the tuple stream
//! 2. sort tuples by `(minimizer, offset)`
//! 3. build the MPHF over distinct minimizers
//! 4. build the bucket tables (consuming the pool)
//! 5. build the skew index for crowded buckets
//!
//! Orchestration is single-threaded; only the MPHF constructions use a
//! bounded thread pool.

pub mod config;
pub(crate) mod parse;
pub mod tuples;

pub use config::BuildConfiguration;

use crate::buckets::Buckets;
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::mphf::{mphf_threads, Minimizers};
use crate::skew_index::SkewIndex;
use parse::{ParseData, SequenceParser};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Builds a [`Dictionary`] from input sequences.
pub struct DictionaryBuilder {
    config: BuildConfiguration,
}

impl DictionaryBuilder {
    /// Create a builder; fails on an invalid configuration before any work
    /// begins.
    pub fn new(config: BuildConfiguration) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Build from a FASTA/cuttlefish file, gzip-compressed or not.
    pub fn build_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Dictionary> {
        let start = Instant::now();
        info!("parsing {}", path.as_ref().display());
        let data = parse::parse_file(path, &self.config)?;
        info!("parsed {} kmers in {:.2?}", data.num_kmers, start.elapsed());
        self.finish(data)
    }

    /// Build from in-memory sequences (one entry per input record).
    pub fn build_from_sequences<S: AsRef<[u8]>>(&self, sequences: &[S]) -> Result<Dictionary> {
        let mut parser = SequenceParser::new(&self.config)?;
        for seq in sequences {
            parser.add_sequence(seq.as_ref())?;
            if parser.saturated() {
                break;
            }
        }
        self.finish(parser.finish())
    }

    /// Stages 2..=5: sort, minimizer MPHF, buckets, skew index.
    fn finish(&self, data: ParseData) -> Result<Dictionary> {
        self.config.print();
        let threads = mphf_threads(self.config.num_threads);

        let mut tuples = data.tuples;
        let start = Instant::now();
        tuples.sort();
        info!("sorted {} tuples in {:.2?}", tuples.len(), start.elapsed());

        let start = Instant::now();
        let distinct: Vec<u64> = tuples.groups().map(|g| g.minimizer).collect();
        let minimizers = Minimizers::build(&distinct, threads)?;
        info!(
            "built minimizer MPHF over {} keys ({} threads) in {:.2?}",
            minimizers.num_keys(),
            threads,
            start.elapsed()
        );

        if self.config.verbose {
            BucketStatistics::compute(&tuples, self.config.l).log();
        }

        let start = Instant::now();
        let buckets = Buckets::build(&tuples, &minimizers, data.pool, self.config.k);
        info!("built buckets in {:.2?}", start.elapsed());

        let start = Instant::now();
        let skew_index = SkewIndex::build(&tuples, &buckets, &self.config, threads)?;
        info!(
            "built skew index ({} partitions, {} kmers) in {:.2?}",
            skew_index.num_partitions(),
            skew_index.num_kmers(),
            start.elapsed()
        );

        let dict = Dictionary::new(
            buckets,
            minimizers,
            skew_index,
            self.config.k,
            self.config.m,
            self.config.seed,
            self.config.canonical_parsing,
            data.num_kmers,
        );
        if self.config.verbose {
            dict.print_space_breakdown();
        }
        Ok(dict)
    }
}

/// Bucket-size distribution, logged when building verbosely.
struct BucketStatistics {
    num_buckets: u64,
    num_strings: u64,
    num_kmers: u64,
    num_singletons: u64,
    num_crowded: u64,
    max_bucket_size: usize,
}

impl BucketStatistics {
    fn compute(tuples: &tuples::MinimizerTuples, l: usize) -> Self {
        let mut stats = Self {
            num_buckets: 0,
            num_strings: 0,
            num_kmers: 0,
            num_singletons: 0,
            num_crowded: 0,
            max_bucket_size: 0,
        };
        let threshold = 1usize << l;
        for group in tuples.groups() {
            stats.num_buckets += 1;
            stats.num_strings += group.size() as u64;
            stats.num_kmers += group.num_kmers();
            if group.size() == 1 {
                stats.num_singletons += 1;
            }
            if group.size() > threshold {
                stats.num_crowded += 1;
            }
            stats.max_bucket_size = stats.max_bucket_size.max(group.size());
        }
        stats
    }

    fn log(&self) {
        let pct = |x: u64| x as f64 * 100.0 / self.num_buckets.max(1) as f64;
        info!("bucket statistics:");
        info!("  buckets: {}", self.num_buckets);
        info!("  strings: {}", self.num_strings);
        info!("  kmers: {}", self.num_kmers);
        info!("  singletons: {} ({:.2}%)", self.num_singletons, pct(self.num_singletons));
        info!("  crowded: {} ({:.2}%)", self.num_crowded, pct(self.num_crowded));
        info!("  max bucket size: {}", self.max_bucket_size);
    }
}
