//! Parsing input sequences into the string pool and the tuple stream.
//!
//! Each sequence is scanned k-mer by k-mer. Consecutive k-mers sharing one
//! minimizer form a *run*; closing a run stores its substring in the pool
//! and emits one tuple per stored string. Runs longer than `W = k - m + 1`
//! k-mers are split into blocks of `B = 2k - m` symbols (the last block may
//! be shorter) so that `num_kmers_in_string <= W` always holds. Within a
//! sequence, every run after the first is glued: it overlaps the previous
//! stored string by `k - 1` symbols, which are stored only once.

use crate::builder::config::BuildConfiguration;
use crate::builder::tuples::{MinimizerTuple, MinimizerTuples};
use crate::error::{Error, Result};
use crate::hasher::SeededHasher;
use crate::kmer;
use crate::pool::{CompactStringPool, PoolBuilder};
use needletail::parse_fastx_file;
use std::path::Path;
use tracing::debug;

/// Output of the parsing stage.
pub(crate) struct ParseData {
    /// Total number of k-mers enumerated from the input.
    pub num_kmers: u64,
    /// One tuple per stored string, in parse order (unsorted).
    pub tuples: MinimizerTuples,
    /// The finalized string pool.
    pub pool: CompactStringPool,
}

/// Streaming parser: feed sequences one at a time, then [`finish`](Self::finish).
pub(crate) struct SequenceParser {
    k: usize,
    m: usize,
    w: usize,
    block: usize,
    canonical: bool,
    max_num_kmers: Option<u64>,
    hasher: SeededHasher,
    pool: PoolBuilder,
    tuples: MinimizerTuples,
    num_kmers: u64,
    num_sequences: u64,
    num_bases: u64,
}

impl SequenceParser {
    pub fn new(config: &BuildConfiguration) -> Result<Self> {
        config.validate()?;
        let k = config.k;
        let m = config.m;
        let w = k - m + 1;
        if w as u64 >= 1u64 << u16::BITS {
            return Err(Error::Width {
                max_kmers_in_string: w as u64,
                bits: u16::BITS,
            });
        }
        Ok(Self {
            k,
            m,
            w,
            block: 2 * k - m,
            canonical: config.canonical_parsing,
            max_num_kmers: config.max_num_kmers,
            hasher: SeededHasher::new(config.seed),
            pool: PoolBuilder::new(k),
            tuples: MinimizerTuples::new(),
            num_kmers: 0,
            num_sequences: 0,
            num_bases: 0,
        })
    }

    /// True once the optional k-mer cap has been reached.
    pub fn saturated(&self) -> bool {
        self.max_num_kmers.is_some_and(|cap| self.num_kmers >= cap)
    }

    /// Scan one sequence. Sequences shorter than k are skipped.
    pub fn add_sequence(&mut self, seq: &[u8]) -> Result<()> {
        let k = self.k;
        if seq.len() < k || self.saturated() {
            return Ok(());
        }
        self.num_sequences += 1;
        self.num_bases += seq.len() as u64;

        let num_positions = seq.len() - k + 1;
        let mut begin = 0usize;
        let mut glue = false;
        let mut prev_minimizer: Option<u64> = None;
        let mut end = 0usize;

        while end < num_positions {
            let x = kmer::try_encode(&seq[end..end + k]).ok_or_else(|| {
                Error::InvalidInput(format!("non-ACGT base in sequence at k-mer position {end}"))
            })?;
            let mut minimizer = kmer::minimizer(x, k, self.m, &self.hasher);
            if self.canonical {
                let x_rc = kmer::reverse_complement(x, k);
                minimizer = minimizer.min(kmer::minimizer(x_rc, k, self.m, &self.hasher));
            }

            match prev_minimizer {
                None => prev_minimizer = Some(minimizer),
                Some(prev) if prev != minimizer => {
                    self.close_run(seq, begin, end, prev, glue)?;
                    begin = end;
                    prev_minimizer = Some(minimizer);
                    glue = true;
                }
                Some(_) => {}
            }

            self.num_kmers += 1;
            end += 1;
            if self.saturated() {
                break;
            }
        }

        if let Some(prev) = prev_minimizer {
            if end > begin {
                self.close_run(seq, begin, end, prev, glue)?;
            }
        }
        Ok(())
    }

    /// Store the run of k-mers at positions `[begin, end)`, splitting into
    /// blocks so that no stored string carries more than `W` k-mers.
    fn close_run(&mut self, seq: &[u8], begin: usize, end: usize, minimizer: u64, glue: bool) -> Result<()> {
        debug_assert!(end > begin);
        let k = self.k;
        let num_kmers = end - begin;
        let num_blocks = num_kmers.div_ceil(self.w);
        let mut size = num_kmers + k - 1;
        for i in 0..num_blocks {
            let n = if i + 1 == num_blocks { size } else { self.block };
            let kmers_in_block = n - k + 1;
            debug_assert!(kmers_in_block <= self.w);

            let mut offset = self.pool.offset();
            if glue {
                offset -= (k - 1) as u64;
            }
            self.tuples.push(MinimizerTuple {
                minimizer,
                offset,
                num_kmers_in_string: kmers_in_block as u16,
            });

            let block_begin = begin + i * self.w;
            self.pool.append(&seq[block_begin..block_begin + n], glue)?;
            if i + 1 != num_blocks {
                size -= self.w;
            }
        }
        Ok(())
    }

    /// Finalize the pool and hand back the parsed data.
    pub fn finish(self) -> ParseData {
        debug!(
            "parsed {} sequences, {} bases, {} kmers, {} strings",
            self.num_sequences,
            self.num_bases,
            self.num_kmers,
            self.tuples.len()
        );
        ParseData {
            num_kmers: self.num_kmers,
            tuples: self.tuples,
            pool: self.pool.finalize(),
        }
    }
}

/// Parse a FASTA/cuttlefish file (optionally gzip-compressed) into a
/// [`ParseData`]. Record headers are ignored; sequence lines shorter than k
/// are skipped.
pub(crate) fn parse_file<P: AsRef<Path>>(path: P, config: &BuildConfiguration) -> Result<ParseData> {
    let path = path.as_ref();
    let mut parser = SequenceParser::new(config)?;

    let mut reader = parse_fastx_file(path)
        .map_err(|e| Error::InvalidInput(format!("cannot open {}: {e}", path.display())))?;
    let mut num_records = 0u64;
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| {
            Error::InvalidInput(format!("malformed record in {}: {e}", path.display()))
        })?;
        parser.add_sequence(&record.seq())?;
        num_records += 1;
        if num_records % 100_000 == 0 {
            debug!("read {num_records} records");
        }
        if parser.saturated() {
            break;
        }
    }
    Ok(parser.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(seqs: &[&[u8]], config: &BuildConfiguration) -> ParseData {
        let mut parser = SequenceParser::new(config).unwrap();
        for seq in seqs {
            parser.add_sequence(seq).unwrap();
        }
        parser.finish()
    }

    #[test]
    fn short_sequences_are_skipped() {
        let config = BuildConfiguration::new(5, 3).unwrap();
        let data = parse(&[b"ACGT"], &config);
        assert_eq!(data.num_kmers, 0);
        assert!(data.tuples.is_empty());
        assert_eq!(data.pool.num_symbols(), 0);
    }

    #[test]
    fn single_sequence_counts_every_position() {
        let config = BuildConfiguration::new(5, 3).unwrap();
        let data = parse(&[b"ACGTACGT"], &config);
        assert_eq!(data.num_kmers, 4); // 8 - 5 + 1
    }

    #[test]
    fn runs_never_exceed_w_kmers() {
        // A homopolymer keeps one minimizer for the whole sequence, forcing
        // the run to be split into blocks of at most W k-mers.
        let config = BuildConfiguration::new(5, 3).unwrap(); // W = 3
        let data = parse(&[b"AAAAAAAAAAAA"], &config); // 8 k-mers
        assert_eq!(data.num_kmers, 8);

        let mut total = 0u64;
        let mut tuples = data.tuples;
        tuples.sort();
        for group in tuples.groups() {
            for t in group.list {
                assert!(t.num_kmers_in_string as usize <= 3);
                total += t.num_kmers_in_string as u64;
            }
        }
        assert_eq!(total, 8);
    }

    #[test]
    fn kmer_count_matches_pieces() {
        // N must equal the sum over pieces of (len - k + 1), whatever the
        // run/glue structure turned out to be.
        let config = BuildConfiguration::new(7, 3).unwrap();
        let data = parse(
            &[b"ACGGTCAGTCCTAGCTAATCGATCGG".as_slice(), b"TTACGGATCGTAGCTAACT".as_slice()],
            &config,
        );
        let k = 7u64;
        let pieces = &data.pool.pieces;
        let from_pieces: u64 = pieces
            .windows(2)
            .map(|w| (w[1] - w[0]) - (k - 1))
            .sum();
        assert_eq!(from_pieces, data.num_kmers);
    }

    #[test]
    fn tuple_offsets_address_their_kmers() {
        // Every tuple's offset must point at a stored k-mer run whose k-mers
        // all carry the tuple's minimizer.
        let mut config = BuildConfiguration::new(9, 5).unwrap();
        config.seed = 3;
        let seq = b"GCTAGCATCGTAGCTAGCTGACTAGCTAGTCA";
        let data = parse(&[seq], &config);
        let hasher = SeededHasher::new(config.seed);

        let mut tuples = data.tuples;
        tuples.sort();
        for group in tuples.groups() {
            for t in group.list {
                for j in 0..t.num_kmers_in_string as u64 {
                    let x = data.pool.kmer_at(t.offset + j, config.k);
                    let mini = kmer::minimizer(x, config.k, config.m, &hasher);
                    assert_eq!(mini, group.minimizer);
                }
            }
        }
    }

    #[test]
    fn max_num_kmers_caps_parsing() {
        let mut config = BuildConfiguration::new(5, 3).unwrap();
        config.max_num_kmers = Some(3);
        let data = parse(&[b"ACGTACGTACGT"], &config);
        assert_eq!(data.num_kmers, 3);
    }

    #[test]
    fn invalid_base_fails_the_parse() {
        let config = BuildConfiguration::new(5, 3).unwrap();
        let mut parser = SequenceParser::new(&config).unwrap();
        assert!(parser.add_sequence(b"ACGTNACGT").is_err());
    }
}
