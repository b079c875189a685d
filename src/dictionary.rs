//! The dictionary: query engine over the finalized tables.
//!
//! `lookup` maps a k-mer to its unique id in `[0, N)`, `access` inverts the
//! mapping, and [`Dictionary::at`] iterates `(id, kmer)` pairs forward from
//! any starting id. Ids are positional: the k-mer starting at pool offset
//! `o` inside piece `p` has id `o - p * (k - 1)`, so bucket order never
//! leaks into the id space.

use crate::buckets::Buckets;
use crate::constants::{ceil_log2, INVALID_UINT64};
use crate::error::Result;
use crate::hasher::SeededHasher;
use crate::kmer;
use crate::mphf::Minimizers;
use crate::skew_index::SkewIndex;
use std::path::Path;
use tracing::info;

/// An immutable k-mer dictionary. Cheap to share read-only across threads.
pub struct Dictionary {
    pub(crate) buckets: Buckets,
    pub(crate) minimizers: Minimizers,
    pub(crate) skew_index: SkewIndex,
    pub(crate) k: usize,
    pub(crate) m: usize,
    pub(crate) seed: u64,
    pub(crate) canonical: bool,
    pub(crate) size: u64,
    hasher: SeededHasher,
}

impl Dictionary {
    pub(crate) fn new(
        buckets: Buckets,
        minimizers: Minimizers,
        skew_index: SkewIndex,
        k: usize,
        m: usize,
        seed: u64,
        canonical: bool,
        size: u64,
    ) -> Self {
        Self {
            buckets,
            minimizers,
            skew_index,
            k,
            m,
            seed,
            canonical,
            size,
            hasher: SeededHasher::new(seed),
        }
    }

    /// K-mer length.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Minimizer length.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Hash seed the dictionary was built with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Whether the dictionary matches both k-mer orientations.
    pub fn canonical(&self) -> bool {
        self.canonical
    }

    /// Total number of indexed k-mers (N).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of distinct minimizers.
    pub fn num_minimizers(&self) -> u64 {
        self.minimizers.num_keys()
    }

    /// Number of stored strings (super-k-mers).
    pub fn num_strings(&self) -> u64 {
        self.buckets.num_strings()
    }

    /// Number of pieces in the string pool.
    pub fn num_pieces(&self) -> u64 {
        self.buckets.num_pieces()
    }

    /// Look up a k-mer given as bytes over `{A, C, G, T}`.
    ///
    /// Returns the k-mer's id, or [`INVALID_UINT64`] when the k-mer is not
    /// in the indexed set (or contains a non-ACGT byte). The result is
    /// always either the sentinel or a value in `[0, N)`.
    pub fn lookup(&self, kmer_bytes: &[u8]) -> u64 {
        if kmer_bytes.len() != self.k {
            return INVALID_UINT64;
        }
        match kmer::try_encode(kmer_bytes) {
            Some(x) => self.lookup_uint(x),
            None => INVALID_UINT64,
        }
    }

    /// Look up an already 2-bit-encoded k-mer.
    pub fn lookup_uint(&self, x: u64) -> u64 {
        if self.canonical {
            self.lookup_canonical(x)
        } else {
            self.lookup_regular(x)
        }
    }

    fn lookup_regular(&self, x: u64) -> u64 {
        let minimizer = kmer::minimizer(x, self.k, self.m, &self.hasher);
        let Some(bucket) = self.minimizers.lookup(minimizer) else {
            return INVALID_UINT64;
        };
        let (lo, hi) = self.buckets.locate_bucket(bucket);
        let n = hi - lo;
        if n == 0 {
            return INVALID_UINT64;
        }

        let log2_n = ceil_log2(n);
        if log2_n > self.skew_index.min_log2 && !self.skew_index.is_empty() {
            let rank = self.skew_index.lookup(x, log2_n);
            if rank == INVALID_UINT64 || rank >= n {
                return INVALID_UINT64;
            }
            let offset = self.buckets.string_offset(lo + rank);
            return self.match_in_string(offset, x, None);
        }

        for i in lo..hi {
            let offset = self.buckets.string_offset(i);
            let id = self.match_in_string(offset, x, None);
            if id != INVALID_UINT64 {
                return id;
            }
        }
        INVALID_UINT64
    }

    fn lookup_canonical(&self, x: u64) -> u64 {
        let x_rc = kmer::reverse_complement(x, self.k);
        let minimizer = kmer::minimizer(x, self.k, self.m, &self.hasher)
            .min(kmer::minimizer(x_rc, self.k, self.m, &self.hasher));
        let Some(bucket) = self.minimizers.lookup(minimizer) else {
            return INVALID_UINT64;
        };
        let (lo, hi) = self.buckets.locate_bucket(bucket);
        let n = hi - lo;
        if n == 0 {
            return INVALID_UINT64;
        }

        let log2_n = ceil_log2(n);
        if log2_n > self.skew_index.min_log2 && !self.skew_index.is_empty() {
            // the stored orientation is unknown, so both serve as MPHF keys
            for key in [x, x_rc] {
                let rank = self.skew_index.lookup(key, log2_n);
                if rank != INVALID_UINT64 && rank < n {
                    let offset = self.buckets.string_offset(lo + rank);
                    let id = self.match_in_string(offset, x, Some(x_rc));
                    if id != INVALID_UINT64 {
                        return id;
                    }
                }
            }
            return INVALID_UINT64;
        }

        for i in lo..hi {
            let offset = self.buckets.string_offset(i);
            let id = self.match_in_string(offset, x, Some(x_rc));
            if id != INVALID_UINT64 {
                return id;
            }
        }
        INVALID_UINT64
    }

    /// Compare the query against the window of k-mers stored from `offset`,
    /// bounded by the enclosing piece. Returns the global id of a match.
    #[inline]
    fn match_in_string(&self, offset: u64, x: u64, x_rc: Option<u64>) -> u64 {
        let Some((base_id, piece_end)) = self.buckets.offset_to_id(offset) else {
            return INVALID_UINT64;
        };
        let k = self.k as u64;
        let span = piece_end - offset;
        if span < k {
            return INVALID_UINT64;
        }
        let window = ((self.k - self.m + 1) as u64).min(span - k + 1);
        for w in 0..window {
            let stored = self.buckets.kmer_at(offset + w);
            if stored == x || x_rc == Some(stored) {
                return base_id + w;
            }
        }
        INVALID_UINT64
    }

    /// Decode the k-mer with id `id` into `out` (at least k bytes).
    ///
    /// Panics when `id >= self.size()`; in-range ids are a caller
    /// precondition.
    pub fn access(&self, id: u64, out: &mut [u8]) {
        assert!(id < self.size, "k-mer id {id} out of range [0, {})", self.size);
        assert!(out.len() >= self.k, "output buffer shorter than k");
        let offset = self.buckets.id_to_offset(id);
        kmer::decode(self.buckets.kmer_at(offset), self.k, out);
    }

    /// Decode the k-mer with id `id` to an owned `String`.
    pub fn access_string(&self, id: u64) -> String {
        let mut out = vec![0u8; self.k];
        self.access(id, &mut out);
        String::from_utf8(out).unwrap()
    }

    /// Iterate `(id, kmer)` pairs forward from `id` up to N, decoding
    /// sequentially through the pool and crossing piece boundaries.
    pub fn at(&self, id: u64) -> KmerIterator<'_> {
        assert!(id <= self.size, "start id {id} out of range [0, {}]", self.size);
        if id == self.size {
            return KmerIterator {
                dict: self,
                id,
                offset: 0,
                piece: 0,
                piece_end: 0,
            };
        }
        let offset = self.buckets.id_to_offset(id);
        let (piece, _begin, piece_end) = self
            .buckets
            .pieces
            .locate_with_end(offset)
            .expect("in-range id must fall inside a piece");
        KmerIterator {
            dict: self,
            id,
            offset,
            piece,
            piece_end,
        }
    }

    /// Iterate all `(id, kmer)` pairs, in id order.
    pub fn iter(&self) -> KmerIterator<'_> {
        self.at(0)
    }

    /// Total index size in bytes (excluding the struct itself).
    pub fn num_bytes(&self) -> usize {
        self.buckets.strings_bytes()
            + self.buckets.pieces_bytes()
            + self.buckets.boundaries_bytes()
            + self.buckets.offsets_bytes()
            + self.minimizers.serialized_bytes()
            + self.skew_index.positions_bytes()
            + self.skew_index.mphf_bytes()
    }

    /// Log a per-component space breakdown in bits per k-mer.
    pub fn print_space_breakdown(&self) {
        let n = self.size.max(1) as f64;
        let bits = |bytes: usize| bytes as f64 * 8.0 / n;
        info!("total index size: {} bytes ({:.3} bits/kmer)", self.num_bytes(), bits(self.num_bytes()));
        info!("  strings:                   {:.3} bits/kmer", bits(self.buckets.strings_bytes()));
        info!("  pieces:                    {:.3} bits/kmer", bits(self.buckets.pieces_bytes()));
        info!("  num_strings_before_bucket: {:.3} bits/kmer", bits(self.buckets.boundaries_bytes()));
        info!("  offsets:                   {:.3} bits/kmer", bits(self.buckets.offsets_bytes()));
        info!("  minimizer MPHF:            {:.3} bits/kmer", bits(self.minimizers.serialized_bytes()));
        info!("  skew positions:            {:.3} bits/kmer", bits(self.skew_index.positions_bytes()));
        info!("  skew MPHFs:                {:.3} bits/kmer", bits(self.skew_index.mphf_bytes()));
    }

    /// Serialize the dictionary to a single binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        crate::serialization::write_dictionary(self, &mut writer)
    }

    /// Load a dictionary previously written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        crate::serialization::read_dictionary(&mut reader)
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("k", &self.k)
            .field("m", &self.m)
            .field("canonical", &self.canonical)
            .field("size", &self.size)
            .field("num_minimizers", &self.num_minimizers())
            .field("num_strings", &self.num_strings())
            .finish()
    }
}

/// Forward `(id, kmer)` iterator over a dictionary; see [`Dictionary::at`].
pub struct KmerIterator<'a> {
    dict: &'a Dictionary,
    id: u64,
    offset: u64,
    piece: u64,
    piece_end: u64,
}

impl Iterator for KmerIterator<'_> {
    type Item = (u64, String);

    fn next(&mut self) -> Option<Self::Item> {
        if self.id == self.dict.size {
            return None;
        }
        let k = self.dict.k as u64;
        if self.offset + k > self.piece_end {
            // piece exhausted: the next one starts at the current boundary
            self.piece += 1;
            self.offset = self.piece_end;
            self.piece_end = self.dict.buckets.piece_boundary(self.piece + 1);
        }
        let item = (
            self.id,
            kmer::to_string(self.dict.buckets.kmer_at(self.offset), self.dict.k),
        );
        self.id += 1;
        self.offset += 1;
        Some(item)
    }
}
