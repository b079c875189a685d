//! Single-file binary serialization of a [`Dictionary`].
//!
//! Layout (all integers little-endian, every component self-describing):
//!
//! ```text
//! magic "MDIX0001" | version major/minor (u32 each)
//! k, m, seed (u64) | canonical (u8) | size (u64)
//! minimizer MPHF: num_keys (u64), blob length (u64), PHast blob
//! pieces                    (cseq Elias-Fano format)
//! num_strings_before_bucket (cseq Elias-Fano format)
//! offsets                   (epserde BitFieldVec format)
//! strings: length (u64), packed bytes
//! skew block: l (u64), max_num_strings_in_bucket (u64), P (u32),
//!             then per partition: blob length (u64), PHast blob,
//!             positions (epserde BitFieldVec format)
//! ```

use crate::buckets::Buckets;
use crate::dictionary::Dictionary;
use crate::ef::EliasFano;
use crate::error::{Error, Result};
use crate::mphf::{read_mphf, Minimizers, Mphf};
use crate::skew_index::SkewIndex;
use std::io::{Read, Write};
use sux::bits::bit_field_vec::BitFieldVec;

const MAGIC: &[u8; 8] = b"MDIX0001";
const FORMAT_VERSION: (u32, u32) = (1, 0);

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_mphf_blob<W: Write>(writer: &mut W, mphf: &Mphf) -> Result<()> {
    let mut blob = Vec::new();
    mphf.write(&mut blob)?;
    write_u64(writer, blob.len() as u64)?;
    writer.write_all(&blob)?;
    Ok(())
}

fn read_mphf_blob<R: Read>(reader: &mut R) -> Result<Mphf> {
    let len = read_u64(reader)? as usize;
    let mut blob = vec![0u8; len];
    reader.read_exact(&mut blob)?;
    Ok(read_mphf(&mut &blob[..])?)
}

fn write_bit_field_vec<W: Write>(writer: &mut W, v: &BitFieldVec<usize>) -> Result<()> {
    use epserde::ser::Serialize;
    // SAFETY: epserde's BitFieldVec serialization preserves the data layout
    unsafe { v.serialize(writer) }.map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(())
}

fn read_bit_field_vec<R: Read>(reader: &mut R) -> Result<BitFieldVec<usize>> {
    use epserde::deser::Deserialize;
    // SAFETY: reading data produced by write_bit_field_vec
    unsafe { BitFieldVec::deserialize_full(reader) }.map_err(|e| Error::Serialization(e.to_string()))
}

/// Write `dict` to `writer` in the format described at the module level.
pub fn write_dictionary<W: Write>(dict: &Dictionary, writer: &mut W) -> Result<()> {
    writer.write_all(MAGIC)?;
    write_u32(writer, FORMAT_VERSION.0)?;
    write_u32(writer, FORMAT_VERSION.1)?;

    write_u64(writer, dict.k as u64)?;
    write_u64(writer, dict.m as u64)?;
    write_u64(writer, dict.seed)?;
    writer.write_all(&[dict.canonical as u8])?;
    write_u64(writer, dict.size)?;

    write_u64(writer, dict.minimizers.num_keys())?;
    if let Some(mphf) = dict.minimizers.mphf() {
        write_mphf_blob(writer, mphf)?;
    }

    dict.buckets.pieces.write_to(writer)?;
    dict.buckets.num_strings_before_bucket.write_to(writer)?;
    write_bit_field_vec(writer, &dict.buckets.offsets)?;
    write_u64(writer, dict.buckets.strings.len() as u64)?;
    writer.write_all(&dict.buckets.strings)?;

    write_u64(writer, dict.skew_index.min_log2 as u64)?;
    write_u64(writer, dict.skew_index.max_num_strings_in_bucket)?;
    write_u32(writer, dict.skew_index.num_partitions() as u32)?;
    for (mphf, positions) in dict.skew_index.mphfs.iter().zip(&dict.skew_index.positions) {
        write_mphf_blob(writer, mphf)?;
        write_bit_field_vec(writer, positions)?;
    }
    Ok(())
}

/// Read a dictionary written by [`write_dictionary`].
pub fn read_dictionary<R: Read>(reader: &mut R) -> Result<Dictionary> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::Serialization("bad magic number".into()));
    }
    let major = read_u32(reader)?;
    let minor = read_u32(reader)?;
    if major != FORMAT_VERSION.0 {
        return Err(Error::Serialization(format!(
            "incompatible format version {major}.{minor}, expected {}.{}",
            FORMAT_VERSION.0, FORMAT_VERSION.1
        )));
    }

    let k = read_u64(reader)? as usize;
    let m = read_u64(reader)? as usize;
    let seed = read_u64(reader)?;
    let mut canonical = [0u8; 1];
    reader.read_exact(&mut canonical)?;
    let size = read_u64(reader)?;

    let num_keys = read_u64(reader)?;
    let mphf = if num_keys > 0 {
        Some(read_mphf_blob(reader)?)
    } else {
        None
    };
    let minimizers = Minimizers::from_parts(mphf, num_keys);

    let pieces = EliasFano::read_from(reader)?;
    let num_strings_before_bucket = EliasFano::read_from(reader)?;
    let offsets = read_bit_field_vec(reader)?;
    let strings_len = read_u64(reader)? as usize;
    let mut strings = vec![0u8; strings_len];
    reader.read_exact(&mut strings)?;
    let buckets = Buckets::from_parts(pieces, num_strings_before_bucket, offsets, strings, k);

    let min_log2 = read_u64(reader)? as usize;
    let max_num_strings_in_bucket = read_u64(reader)?;
    let num_partitions = read_u32(reader)? as usize;
    let mut mphfs = Vec::with_capacity(num_partitions);
    let mut positions = Vec::with_capacity(num_partitions);
    for _ in 0..num_partitions {
        mphfs.push(read_mphf_blob(reader)?);
        positions.push(read_bit_field_vec(reader)?);
    }
    let skew_index = SkewIndex::from_parts(min_log2, max_num_strings_in_bucket, mphfs, positions);

    Ok(Dictionary::new(
        buckets,
        minimizers,
        skew_index,
        k,
        m,
        seed,
        canonical[0] != 0,
        size,
    ))
}
