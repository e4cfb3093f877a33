//! Prefixed variable-length integers
//!
//! A value is written into the low `N` bits of the first byte (the high bits
//! carry the representation tag). Values of `2^N - 1` or more fill the prefix
//! and continue in base-128 bytes, least significant group first, with the
//! high bit set on every byte except the last.

use crate::h2::error::{Error, Result};
use bytes::BufMut;

/// Longest continuation a `u32` can need after the prefix byte
const MAX_CONTINUATION_BYTES: usize = 5;

fn prefix_max(prefix_bits: u8) -> u32 {
    assert!(
        (1..=8).contains(&prefix_bits),
        "prefix width {} out of range 1..=8",
        prefix_bits
    );
    (1u32 << prefix_bits) - 1
}

/// Append `value` with an `prefix_bits`-wide prefix; `pattern` supplies the
/// bits above the prefix
///
/// # Panics
///
/// Panics if `prefix_bits` is not in `1..=8`.
pub fn encode<B: BufMut>(buf: &mut B, value: u32, prefix_bits: u8, pattern: u8) {
    let max = prefix_max(prefix_bits);
    if value < max {
        buf.put_u8(pattern | value as u8);
        return;
    }

    buf.put_u8(pattern | max as u8);
    let mut remaining = value - max;
    while remaining >= 0x80 {
        buf.put_u8(0x80 | (remaining & 0x7F) as u8);
        remaining >>= 7;
    }
    buf.put_u8(remaining as u8);
}

/// Decode a value from the start of `buf`, returning it with the number of
/// bytes consumed
pub fn decode(buf: &[u8], prefix_bits: u8) -> Result<(u32, usize)> {
    let max = prefix_max(prefix_bits);
    let first = *buf
        .first()
        .ok_or_else(|| Error::Compression("truncated integer".to_string()))?;

    let prefix = first as u32 & max;
    if prefix < max {
        return Ok((prefix, 1));
    }

    let mut value = max as u64;
    let mut shift = 0u32;
    for (i, &byte) in buf[1..].iter().enumerate() {
        if i >= MAX_CONTINUATION_BYTES {
            break;
        }
        value += ((byte & 0x7F) as u64) << shift;
        if value > u32::MAX as u64 {
            return Err(Error::Compression(format!(
                "integer overflows 32 bits after {} bytes",
                i + 2
            )));
        }
        if byte & 0x80 == 0 {
            return Ok((value as u32, i + 2));
        }
        shift += 7;
    }

    if buf.len() > MAX_CONTINUATION_BYTES + 1 {
        Err(Error::Compression("integer encoding too long".to_string()))
    } else {
        Err(Error::Compression("truncated integer".to_string()))
    }
}

/// Encode `value` on its own
pub fn to_uvarint(value: u32, prefix_bits: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + MAX_CONTINUATION_BYTES);
    encode(&mut buf, value, prefix_bits, 0);
    buf
}

/// Decode a value that must occupy all of `bytes`
pub fn from_uvarint(bytes: &[u8], prefix_bits: u8) -> Result<u32> {
    let (value, used) = decode(bytes, prefix_bits)?;
    if used != bytes.len() {
        return Err(Error::Compression(format!(
            "{} trailing bytes after integer",
            bytes.len() - used
        )));
    }
    Ok(value)
}
