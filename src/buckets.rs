//! Buckets: the routing tables from minimizers to stored strings, plus the
//! string pool itself once construction hands it over.
//!
//! `num_strings_before_bucket[i]` counts the strings assigned to buckets
//! with id below `i`; bucket `b` owns `offsets[nsb[b]..nsb[b+1]]`, each entry
//! the pool offset of one string's first k-mer. `pieces` delimits the
//! maximal glued walks of the pool and is what turns a pool offset into a
//! global k-mer id: a k-mer starting at offset `o` inside piece `p` has id
//! `o - p * (k - 1)`.

use crate::constants::ceil_log2;
use crate::ef::EliasFano;
use crate::builder::tuples::MinimizerTuples;
use crate::mphf::Minimizers;
use crate::pool::{read_kmer, CompactStringPool};
use sux::bits::bit_field_vec::BitFieldVec;
use sux::traits::{BitFieldSlice, BitFieldSliceCore, BitFieldSliceMut};

/// Finalized bucket tables and string pool.
pub struct Buckets {
    pub(crate) pieces: EliasFano,
    pub(crate) num_strings_before_bucket: EliasFano,
    pub(crate) offsets: BitFieldVec<usize>,
    pub(crate) strings: Vec<u8>,
    pub(crate) k: usize,
}

impl Buckets {
    /// Build the bucket tables from the sorted tuple stream, consuming the
    /// pool. Two walks over the groups: one to count strings per bucket
    /// (followed by an in-place prefix sum), one to write the offsets.
    pub(crate) fn build(
        tuples: &MinimizerTuples,
        minimizers: &Minimizers,
        pool: CompactStringPool,
        k: usize,
    ) -> Self {
        let num_minimizers = minimizers.num_keys() as usize;
        let num_strings = tuples.len();

        let mut nsb = vec![0u64; num_minimizers + 1];
        for group in tuples.groups() {
            let bucket = minimizers
                .lookup(group.minimizer)
                .expect("build-set minimizer must resolve") as usize;
            nsb[bucket + 1] += group.size() as u64;
        }
        for i in 1..nsb.len() {
            nsb[i] += nsb[i - 1];
        }
        debug_assert_eq!(nsb[num_minimizers], num_strings as u64);

        let width = ceil_log2(pool.num_symbols()).max(1);
        let mut offsets = BitFieldVec::new(width, num_strings);
        for group in tuples.groups() {
            let bucket = minimizers
                .lookup(group.minimizer)
                .expect("build-set minimizer must resolve") as usize;
            let base = nsb[bucket] as usize;
            for (i, tuple) in group.list.iter().enumerate() {
                offsets.set(base + i, tuple.offset as usize);
            }
        }

        Self {
            pieces: EliasFano::from_slice(&pool.pieces),
            num_strings_before_bucket: EliasFano::from_slice(&nsb),
            offsets,
            strings: pool.strings,
            k,
        }
    }

    /// Reassemble from deserialized parts.
    pub(crate) fn from_parts(
        pieces: EliasFano,
        num_strings_before_bucket: EliasFano,
        offsets: BitFieldVec<usize>,
        strings: Vec<u8>,
        k: usize,
    ) -> Self {
        Self {
            pieces,
            num_strings_before_bucket,
            offsets,
            strings,
            k,
        }
    }

    /// The range `[lo, hi)` of string indices owned by a bucket.
    #[inline]
    pub fn locate_bucket(&self, bucket: u64) -> (u64, u64) {
        let lo = self.num_strings_before_bucket.access(bucket as usize);
        let hi = self.num_strings_before_bucket.access(bucket as usize + 1);
        (lo, hi)
    }

    /// Pool offset of the `i`-th bucketed string.
    #[inline]
    pub fn string_offset(&self, i: u64) -> u64 {
        self.offsets.get(i as usize) as u64
    }

    /// Number of bucketed strings.
    pub fn num_strings(&self) -> u64 {
        self.offsets.len() as u64
    }

    /// Number of buckets (distinct minimizers).
    pub fn num_buckets(&self) -> u64 {
        self.num_strings_before_bucket.len() as u64 - 1
    }

    /// Number of pieces in the pool.
    pub fn num_pieces(&self) -> u64 {
        self.pieces.len() as u64 - 1
    }

    /// Total number of 2-bit symbols in the pool.
    pub fn num_symbols(&self) -> u64 {
        self.pieces.access(self.pieces.len() - 1)
    }

    /// Read the k-mer at symbol position `pos`.
    #[inline]
    pub(crate) fn kmer_at(&self, pos: u64) -> u64 {
        read_kmer(&self.strings, pos as usize, self.k)
    }

    /// Map a pool offset to `(kmer_id, piece_end)`: the global id of the
    /// k-mer starting at `offset` and the symbol offset at which its piece
    /// ends. `None` when `offset` is past the pool.
    #[inline]
    pub(crate) fn offset_to_id(&self, offset: u64) -> Option<(u64, u64)> {
        let (piece, _begin, end) = self.pieces.locate_with_end(offset)?;
        Some((offset - piece * (self.k as u64 - 1), end))
    }

    /// Pool offset of the k-mer with global id `id`.
    ///
    /// Binary search over `pieces`: the ids of piece `p` start at
    /// `pieces[p] - p * (k - 1)`, a non-decreasing function of `p`.
    pub(crate) fn id_to_offset(&self, id: u64) -> u64 {
        let k1 = self.k as u64 - 1;
        let num_pieces = self.pieces.len() - 1;
        let mut lo = 0usize;
        let mut hi = num_pieces;
        // invariant: ids_before(lo) <= id < ids_before(hi)
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.pieces.access(mid) - mid as u64 * k1 <= id {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        id + lo as u64 * k1
    }

    /// Symbol offset at which piece `p` begins.
    #[inline]
    pub(crate) fn piece_boundary(&self, p: u64) -> u64 {
        self.pieces.access(p as usize)
    }

    /// Bytes used by the piece boundaries.
    pub fn pieces_bytes(&self) -> usize {
        self.pieces.size_bytes()
    }

    /// Bytes used by the bucket boundary sequence.
    pub fn boundaries_bytes(&self) -> usize {
        self.num_strings_before_bucket.size_bytes()
    }

    /// Bytes used by the packed offsets.
    pub fn offsets_bytes(&self) -> usize {
        (self.offsets.len() * self.offsets.bit_width()).div_ceil(8)
    }

    /// Bytes used by the packed strings.
    pub fn strings_bytes(&self) -> usize {
        self.strings.len()
    }
}

impl std::fmt::Debug for Buckets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buckets")
            .field("num_buckets", &self.num_buckets())
            .field("num_strings", &self.num_strings())
            .field("num_pieces", &self.num_pieces())
            .field("num_symbols", &self.num_symbols())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tuples::MinimizerTuple;
    use crate::pool::PoolBuilder;

    fn pool_of(strings: &[&[u8]], k: usize) -> CompactStringPool {
        let mut builder = PoolBuilder::new(k);
        for s in strings {
            builder.append(s, false).unwrap();
        }
        builder.finalize()
    }

    fn tuples_of(entries: &[(u64, u64, u16)]) -> MinimizerTuples {
        let mut tuples = MinimizerTuples::new();
        for &(minimizer, offset, n) in entries {
            tuples.push(MinimizerTuple {
                minimizer,
                offset,
                num_kmers_in_string: n,
            });
        }
        tuples.sort();
        tuples
    }

    #[test]
    fn bucket_ranges_partition_the_offsets() {
        let k = 3;
        // two pieces: "ACGTA" (3 k-mers) and "TTTTT" (3 k-mers)
        let pool = pool_of(&[b"ACGTA", b"TTTTT"], k);
        // three strings across two minimizers
        let tuples = tuples_of(&[(7, 0, 2), (7, 5, 3), (9, 2, 1)]);
        let minimizers = Minimizers::build(&[7, 9], 1).unwrap();
        let buckets = Buckets::build(&tuples, &minimizers, pool, k);

        assert_eq!(buckets.num_buckets(), 2);
        assert_eq!(buckets.num_strings(), 3);

        let b7 = minimizers.lookup(7).unwrap();
        let b9 = minimizers.lookup(9).unwrap();
        let (lo7, hi7) = buckets.locate_bucket(b7);
        let (lo9, hi9) = buckets.locate_bucket(b9);
        assert_eq!(hi7 - lo7, 2);
        assert_eq!(hi9 - lo9, 1);

        // bucket 7's offsets in tuple order
        assert_eq!(buckets.string_offset(lo7), 0);
        assert_eq!(buckets.string_offset(lo7 + 1), 5);
        assert_eq!(buckets.string_offset(lo9), 2);

        // the two ranges cover [0, 3) without overlap
        let mut covered: Vec<u64> = (lo7..hi7).chain(lo9..hi9).collect();
        covered.sort_unstable();
        assert_eq!(covered, vec![0, 1, 2]);
    }

    #[test]
    fn offset_to_id_accounts_for_pieces() {
        let k = 3;
        let pool = pool_of(&[b"ACGTA", b"TTTTT"], k);
        let tuples = tuples_of(&[(7, 0, 3), (9, 5, 3)]);
        let minimizers = Minimizers::build(&[7, 9], 1).unwrap();
        let buckets = Buckets::build(&tuples, &minimizers, pool, k);

        // piece 0: offsets 0..5, ids 0..3; piece 1: offsets 5..10, ids 3..6
        assert_eq!(buckets.offset_to_id(0), Some((0, 5)));
        assert_eq!(buckets.offset_to_id(2), Some((2, 5)));
        assert_eq!(buckets.offset_to_id(5), Some((3, 10)));
        assert_eq!(buckets.offset_to_id(7), Some((5, 10)));
        assert_eq!(buckets.offset_to_id(10), None);
    }

    #[test]
    fn id_to_offset_inverts_offset_to_id() {
        let k = 3;
        let pool = pool_of(&[b"ACGTA", b"TTTTT", b"AACC"], k);
        let tuples = tuples_of(&[(7, 0, 3), (9, 5, 3), (11, 10, 2)]);
        let minimizers = Minimizers::build(&[7, 9, 11], 1).unwrap();
        let buckets = Buckets::build(&tuples, &minimizers, pool, k);

        let n = 8u64; // 3 + 3 + 2 k-mers
        for id in 0..n {
            let offset = buckets.id_to_offset(id);
            let (back, _end) = buckets.offset_to_id(offset).unwrap();
            assert_eq!(back, id);
        }
    }
}
