//! Elias-Fano encoding of monotone `u64` sequences.
//!
//! Thin wrapper over the `cseq` Elias-Fano `Sequence`, providing O(1) random
//! access and a successor-based `locate_with_end` used to map a pool offset
//! to the piece that contains it. Space is roughly `2 + log(U/N)` bits per
//! element.

use std::io;

use ph::GetSize;

type Sequence = cseq::elias_fano::Sequence;

/// An immutable monotone sequence of `u64` values in Elias-Fano encoding.
pub struct EliasFano {
    ef: Sequence,
}

impl EliasFano {
    /// Build from a non-decreasing slice of values.
    pub fn from_slice(values: &[u64]) -> Self {
        Self {
            ef: Sequence::with_items_from_slice(values),
        }
    }

    /// Value at index `i`. Caller must ensure `i < self.len()`.
    #[inline]
    pub fn access(&self, i: usize) -> u64 {
        debug_assert!(i < self.ef.len());
        // SAFETY: bounds asserted above
        unsafe { self.ef.get_unchecked(i) }
    }

    /// Find the interval containing `pos`: returns `(i, begin, end)` such
    /// that `values[i] <= pos < values[i + 1]`, with `begin = values[i]` and
    /// `end = values[i + 1]`. `None` when `pos` is past the last value.
    ///
    /// One successor query plus a cheap cursor step, rather than two
    /// independent accesses.
    #[inline]
    pub fn locate_with_end(&self, pos: u64) -> Option<(u64, u64, u64)> {
        let n = self.ef.len();
        if n < 2 {
            return None;
        }

        // Cursor on the first element >= pos; past-the-end when none exists.
        let mut cursor = self.ef.geq_cursor(pos);
        if cursor.is_end() {
            return None;
        }

        // SAFETY: cursor is not past-the-end
        let val = unsafe { cursor.value_unchecked() };
        let idx = cursor.index();

        if val == pos {
            // Exact boundary hit: the interval starting at pos.
            if idx + 1 < n {
                cursor.advance();
                let end = unsafe { cursor.value_unchecked() };
                Some((idx as u64, val, end))
            } else {
                None
            }
        } else {
            // val > pos: pos lies in the interval starting at idx - 1.
            debug_assert!(idx > 0);
            cursor.advance_back();
            let begin = unsafe { cursor.value_unchecked() };
            Some(((idx - 1) as u64, begin, val))
        }
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.ef.len()
    }

    /// Whether the sequence is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ef.is_empty()
    }

    /// Total bytes used, including selection structures.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.ef.size_bytes()
    }

    /// Serialize in cseq's self-describing binary format.
    pub fn write_to(&self, writer: &mut dyn io::Write) -> io::Result<()> {
        self.ef.write(writer)
    }

    /// Deserialize from cseq's binary format.
    pub fn read_from(reader: &mut dyn io::Read) -> io::Result<Self> {
        Ok(Self {
            ef: Sequence::read(reader)?,
        })
    }
}

impl std::fmt::Debug for EliasFano {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EliasFano").field("len", &self.ef.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_roundtrip() {
        let values = vec![0u64, 7, 7, 30, 100, 101];
        let ef = EliasFano::from_slice(&values);
        assert_eq!(ef.len(), values.len());
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(ef.access(i), v);
        }
    }

    #[test]
    fn locate_with_end_against_reference() {
        let values = vec![0u64, 9, 21, 22, 60, 200];
        let ef = EliasFano::from_slice(&values);
        let universe = *values.last().unwrap();
        for pos in 0..=universe + 1 {
            let expected = (0..values.len() - 1)
                .find(|&i| values[i] <= pos && pos < values[i + 1])
                .map(|i| (i as u64, values[i], values[i + 1]));
            assert_eq!(ef.locate_with_end(pos), expected, "pos = {pos}");
        }
    }

    #[test]
    fn serialization_roundtrip() {
        let values = vec![0u64, 12, 12, 40, 1000];
        let ef = EliasFano::from_slice(&values);
        let mut buf = Vec::new();
        ef.write_to(&mut buf).unwrap();
        let ef2 = EliasFano::read_from(&mut &buf[..]).unwrap();
        assert_eq!(ef2.len(), values.len());
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(ef2.access(i), v);
        }
        assert_eq!(ef2.locate_with_end(13), Some((2, 12, 40)));
    }
}
