//! The skew index: exact-k-mer perfect hashing for crowded buckets.
//!
//! Buckets holding more than `2^l` strings are the dominant lookup cost, so
//! their k-mers are indexed directly. Crowded buckets are partitioned by
//! size class: partition `p` covers bucket sizes in `(2^(l+p), 2^(l+p+1)]`,
//! the last partition is upper-bounded by the largest bucket. Each partition
//! carries one MPHF over all its k-mers and a bit-packed `positions` array
//! storing, per k-mer, the rank of its string within its bucket. A lookup
//! in a crowded bucket thus costs one MPHF evaluation and one candidate
//! verification instead of a linear scan.

use crate::buckets::Buckets;
use crate::builder::config::BuildConfiguration;
use crate::builder::tuples::{MinimizerTuple, MinimizerTuples};
use crate::constants::{ceil_log2, INVALID_UINT64};
use crate::error::{Error, Result};
use crate::mphf::{build_mphf, Mphf};
use sux::bits::bit_field_vec::BitFieldVec;
use sux::traits::{BitFieldSlice, BitFieldSliceCore, BitFieldSliceMut};
use tracing::debug;

/// Partitioned MPHFs over the k-mers of crowded buckets.
pub struct SkewIndex {
    pub(crate) min_log2: usize,
    pub(crate) max_num_strings_in_bucket: u64,
    pub(crate) mphfs: Vec<Mphf>,
    pub(crate) positions: Vec<BitFieldVec<usize>>,
}

impl SkewIndex {
    /// An index with no partitions (no bucket exceeded `2^l` strings).
    pub fn empty(l: usize) -> Self {
        Self {
            min_log2: l,
            max_num_strings_in_bucket: 0,
            mphfs: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Reassemble from deserialized parts.
    pub(crate) fn from_parts(
        min_log2: usize,
        max_num_strings_in_bucket: u64,
        mphfs: Vec<Mphf>,
        positions: Vec<BitFieldVec<usize>>,
    ) -> Self {
        Self {
            min_log2,
            max_num_strings_in_bucket,
            mphfs,
            positions,
        }
    }

    /// Whether no bucket was crowded enough to be indexed.
    pub fn is_empty(&self) -> bool {
        self.mphfs.is_empty()
    }

    /// Number of size-class partitions.
    pub fn num_partitions(&self) -> usize {
        self.mphfs.len()
    }

    /// The split threshold exponent `l` this index was built with.
    pub fn min_log2(&self) -> usize {
        self.min_log2
    }

    /// Build from the sorted tuple stream. `buckets` supplies the string
    /// pool for resolving offsets to exact k-mer encodings.
    ///
    /// Three passes over the crowded groups, ordered by size: count the
    /// k-mers per partition (failing on an empty size class), build one MPHF
    /// per partition, then fill `positions` with within-bucket string ranks.
    pub(crate) fn build(
        tuples: &MinimizerTuples,
        buckets: &Buckets,
        config: &BuildConfiguration,
        threads: usize,
    ) -> Result<Self> {
        let l = config.l;
        let threshold = 1u64 << l;

        let mut lists: Vec<&[MinimizerTuple]> = tuples
            .groups()
            .filter(|g| g.size() as u64 > threshold)
            .map(|g| g.list)
            .collect();
        if lists.is_empty() {
            return Ok(Self::empty(l));
        }
        lists.sort_by_key(|list| list.len());

        let max_num_strings = lists.last().unwrap().len() as u64;
        let log2_max = ceil_log2(max_num_strings);
        debug_assert!(log2_max > l);
        let num_partitions = (log2_max - l).max(1);
        debug!(
            "skew index: {} crowded buckets, max size {max_num_strings}, {num_partitions} partitions",
            lists.len()
        );

        // Pass A: k-mers per partition; every size class must be populated.
        let mut num_kmers_in_partition = vec![0u64; num_partitions];
        {
            let mut partition = 0usize;
            let mut lower = threshold;
            let mut upper = partition_upper(0, num_partitions, threshold, max_num_strings);
            for list in &lists {
                while list.len() as u64 > upper {
                    if num_kmers_in_partition[partition] == 0 {
                        return Err(Error::EmptyPartition { lower, upper });
                    }
                    partition += 1;
                    lower = upper;
                    upper = partition_upper(partition, num_partitions, threshold, max_num_strings);
                    if list.len() as u64 > upper {
                        // the class we just advanced into holds no list at all
                        return Err(Error::EmptyPartition { lower, upper });
                    }
                }
                num_kmers_in_partition[partition] +=
                    list.iter().map(|t| t.num_kmers_in_string as u64).sum::<u64>();
            }
            debug_assert_eq!(partition, num_partitions - 1);
        }

        // Passes B and C, one partition at a time: extract the exact k-mer
        // encodings from the pool, build the partition MPHF, then write the
        // within-bucket rank of every k-mer's string.
        let mut mphfs = Vec::with_capacity(num_partitions);
        let mut positions = Vec::with_capacity(num_partitions);
        let mut li = 0usize;
        for partition in 0..num_partitions {
            let upper = partition_upper(partition, num_partitions, threshold, max_num_strings);
            let width = if partition + 1 == num_partitions {
                log2_max
            } else {
                l + partition + 1
            };

            let begin = li;
            while li < lists.len() && lists[li].len() as u64 <= upper {
                li += 1;
            }
            let partition_lists = &lists[begin..li];

            let mut keys = Vec::with_capacity(num_kmers_in_partition[partition] as usize);
            for list in partition_lists {
                for tuple in *list {
                    for j in 0..tuple.num_kmers_in_string as u64 {
                        keys.push(buckets.kmer_at(tuple.offset + j));
                    }
                }
            }
            debug_assert_eq!(keys.len() as u64, num_kmers_in_partition[partition]);

            let mphf = build_mphf(&keys, threads);
            let mut ranks = BitFieldVec::new(width.max(1), keys.len());
            for list in partition_lists {
                for (rank, tuple) in list.iter().enumerate() {
                    debug_assert!(rank < 1usize << width);
                    for j in 0..tuple.num_kmers_in_string as u64 {
                        let slot = mphf.get(&buckets.kmer_at(tuple.offset + j));
                        ranks.set(slot, rank);
                    }
                }
            }
            debug!(
                "skew partition {partition}: {} keys, {width} bits/position",
                keys.len()
            );

            mphfs.push(mphf);
            positions.push(ranks);
        }
        debug_assert_eq!(li, lists.len());

        Ok(Self {
            min_log2: l,
            max_num_strings_in_bucket: max_num_strings,
            mphfs,
            positions,
        })
    }

    /// Rank (within its bucket) of the string holding k-mer `x`, given
    /// `ceil(log2(bucket_size))`. Returns `INVALID_UINT64` when the bucket
    /// size class is below the split threshold or the hash falls out of
    /// range; a surviving rank still requires exact verification by the
    /// caller.
    #[inline]
    pub(crate) fn lookup(&self, x: u64, log2_bucket_size: usize) -> u64 {
        if self.mphfs.is_empty() || log2_bucket_size <= self.min_log2 {
            return INVALID_UINT64;
        }
        let partition = (log2_bucket_size - self.min_log2 - 1).min(self.mphfs.len() - 1);
        let slot = self.mphfs[partition].get(&x);
        if slot >= self.positions[partition].len() {
            return INVALID_UINT64;
        }
        self.positions[partition].get(slot) as u64
    }

    /// Total k-mers covered by the index.
    pub fn num_kmers(&self) -> u64 {
        self.positions.iter().map(|p| p.len() as u64).sum()
    }

    /// Bytes used by the positions arrays.
    pub fn positions_bytes(&self) -> usize {
        self.positions
            .iter()
            .map(|p| (p.len() * p.bit_width()).div_ceil(8))
            .sum()
    }

    /// Serialized size of the partition MPHFs, in bytes.
    pub fn mphf_bytes(&self) -> usize {
        self.mphfs.iter().map(|m| m.write_bytes()).sum()
    }
}

/// Inclusive upper bound of partition `p`'s size class.
#[inline]
fn partition_upper(p: usize, num_partitions: usize, threshold: u64, max_num_strings: u64) -> u64 {
    if p + 1 == num_partitions {
        max_num_strings
    } else {
        threshold << (p + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tuples::MinimizerTuple;
    use crate::mphf::Minimizers;
    use crate::pool::PoolBuilder;

    /// Build a pool and a tuple stream with the given bucket sizes: one
    /// minimizer per bucket, one k-mer per string, distinct string contents.
    fn fixture(bucket_sizes: &[usize], k: usize) -> (MinimizerTuples, Buckets) {
        let mut pool_builder = PoolBuilder::new(k);
        let mut tuples = MinimizerTuples::new();
        let mut offset = 0u64;
        let bases = [b'A', b'C', b'G', b'T'];
        let mut string_id = 0usize;
        for (bucket, &size) in bucket_sizes.iter().enumerate() {
            for _ in 0..size {
                // string content spells out string_id in base 4
                let s: Vec<u8> = (0..k).map(|i| bases[(string_id >> (2 * i)) & 3]).collect();
                pool_builder.append(&s, false).unwrap();
                tuples.push(MinimizerTuple {
                    minimizer: bucket as u64 + 1,
                    offset,
                    num_kmers_in_string: 1,
                });
                offset += k as u64;
                string_id += 1;
            }
        }
        tuples.sort();
        let minimizers =
            Minimizers::build(&(1..=bucket_sizes.len() as u64).collect::<Vec<_>>(), 1).unwrap();
        let buckets = Buckets::build(&tuples, &minimizers, pool_builder.finalize(), k);
        (tuples, buckets)
    }

    fn config_with_l(k: usize, l: usize) -> BuildConfiguration {
        BuildConfiguration {
            l,
            ..BuildConfiguration::new(k, 1).unwrap()
        }
    }

    #[test]
    fn no_crowded_bucket_yields_empty_index() {
        let (tuples, buckets) = fixture(&[2, 3], 4);
        let config = config_with_l(4, 2);
        let index = SkewIndex::build(&tuples, &buckets, &config, 1).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.lookup(0, 10), INVALID_UINT64);
    }

    #[test]
    fn single_partition_covers_largest_bucket() {
        // l = 1: bucket of size 4 is crowded; ceil_log2(4) - 1 = 1 partition
        let (tuples, buckets) = fixture(&[4, 2], 4);
        let config = config_with_l(4, 1);
        let index = SkewIndex::build(&tuples, &buckets, &config, 1).unwrap();
        assert_eq!(index.num_partitions(), 1);
        assert_eq!(index.num_kmers(), 4);
        assert_eq!(index.max_num_strings_in_bucket, 4);
    }

    #[test]
    fn ranks_point_back_to_the_right_string() {
        // l = 2: the size-5 bucket is the only crowded one, a single
        // partition bounded by the maximum bucket size
        let (tuples, buckets) = fixture(&[5, 1], 4);
        let config = config_with_l(4, 2);
        let index = SkewIndex::build(&tuples, &buckets, &config, 1).unwrap();
        assert_eq!(index.num_partitions(), 1);

        // the crowded group, in bucket order
        let group = tuples.groups().find(|g| g.size() == 5).unwrap();
        let log2 = ceil_log2(5);
        for (rank, tuple) in group.list.iter().enumerate() {
            let x = buckets.kmer_at(tuple.offset);
            assert_eq!(index.lookup(x, log2), rank as u64);
        }
    }

    #[test]
    fn unpopulated_size_class_is_an_error() {
        // l = 1: partitions (2,4] and (4,8]; a single bucket of size 8
        // leaves (2,4] empty.
        let (tuples, buckets) = fixture(&[8], 4);
        let config = config_with_l(4, 1);
        let err = SkewIndex::build(&tuples, &buckets, &config, 1).unwrap_err();
        assert!(matches!(err, Error::EmptyPartition { lower: 2, upper: 4 }));
    }
}
