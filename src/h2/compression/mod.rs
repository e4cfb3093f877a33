//! Header compression
//!
//! Header blocks are delta-coded against a per-direction header table and its
//! reference set: the set of entries that make up the "current" header set.
//! A block only carries the differences from the previous set.
//!
//! Representations (first byte):
//!
//! ```text
//! 1xxxxxxx  Indexed                  7-bit prefix table index, toggles reference
//! 011xxxxx  Literal, not indexed     5-bit prefix name index
//! 010xxxxx  Literal, incremental     5-bit prefix name index, appended to table
//! 00xxxxxx  Literal, substitution    6-bit prefix name index, 8-bit prefix
//!                                    substituted index, replaces that entry
//! ```
//!
//! A name index of 0 means the name follows as a literal; N refers to table
//! slot N - 1. Strings are an 8-bit prefix length followed by UTF-8 bytes.

mod decoder;
mod encoder;
pub mod table;
pub mod uvarint;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use table::{HeaderTable, TableKind};

use crate::h2::error::{Error, Result};
use bytes::BufMut;
use std::fmt;

/// Per-entry overhead counted against the table budget
pub const ENTRY_OVERHEAD: usize = 32;

pub(crate) const INDEXED: u8 = 0x80;
pub(crate) const INDEXED_PREFIX: u8 = 7;
pub(crate) const LITERAL_NOT_INDEXED: u8 = 0x60;
pub(crate) const LITERAL_INCREMENTAL: u8 = 0x40;
pub(crate) const LITERAL_PREFIX: u8 = 5;
pub(crate) const LITERAL_SUBSTITUTION: u8 = 0x00;
pub(crate) const SUBSTITUTION_PREFIX: u8 = 6;
pub(crate) const STRING_PREFIX: u8 = 8;

/// A single header name-value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderField {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Size charged against the table budget: name + value + 32
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Look up a header's value by name (first match)
pub fn find_header<'a>(headers: &'a [HeaderField], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name == name)
        .map(|h| h.value.as_str())
}

pub(crate) fn encode_string<B: BufMut>(buf: &mut B, value: &str) {
    // header strings never approach 4 GiB; frame limits cut them off long before
    uvarint::encode(buf, value.len() as u32, STRING_PREFIX, 0);
    buf.put_slice(value.as_bytes());
}

/// Decode a length-prefixed string at `pos`; returns it and the next position
pub(crate) fn decode_string(block: &[u8], pos: usize) -> Result<(String, usize)> {
    let (len, used) = uvarint::decode(&block[pos..], STRING_PREFIX)?;
    let start = pos + used;
    let end = start
        .checked_add(len as usize)
        .filter(|end| *end <= block.len())
        .ok_or_else(|| {
            Error::Compression(format!(
                "string of {} bytes runs past the end of the block",
                len
            ))
        })?;
    let value = std::str::from_utf8(&block[start..end])
        .map_err(|e| Error::Compression(format!("invalid UTF-8 in header: {}", e)))?;
    Ok((value.to_string(), end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::DEFAULT_HEADER_TABLE_SIZE;

    fn h(name: &str, value: &str) -> HeaderField {
        HeaderField::new(name, value)
    }

    fn pair(kind: TableKind, max: usize) -> (Encoder, Decoder) {
        (Encoder::new(kind, max), Decoder::new(kind, max))
    }

    fn roundtrip(encoder: &mut Encoder, decoder: &mut Decoder, headers: &[HeaderField]) {
        let block = encoder.compress(headers).unwrap();
        let decoded = decoder.decompress(&block).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn test_header_field_size() {
        assert_eq!(h("ab", "cde").size(), 37);
        assert_eq!(h("x", "").to_string(), "x: ");
    }

    #[test]
    fn test_string_roundtrip() {
        let mut buf = Vec::new();
        encode_string(&mut buf, "hello");
        assert_eq!(buf[0], 5);
        let (value, next) = decode_string(&buf, 0).unwrap();
        assert_eq!(value, "hello");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn test_string_truncated_or_invalid() {
        assert!(matches!(decode_string(&[5, b'a'], 0), Err(Error::Compression(_))));
        assert!(matches!(decode_string(&[2, 0xC3, 0x28], 0), Err(Error::Compression(_))));
    }

    #[test]
    fn test_request_sequence_roundtrip() {
        let (mut enc, mut dec) = pair(TableKind::Request, DEFAULT_HEADER_TABLE_SIZE);
        let first = vec![
            h(":method", "GET"),
            h(":scheme", "http"),
            h(":host", "example.com"),
            h(":path", "/"),
        ];
        let second = vec![
            h(":method", "GET"),
            h(":scheme", "http"),
            h(":host", "example.com"),
            h(":path", "/style.css"),
            h("accept", "text/css"),
        ];
        roundtrip(&mut enc, &mut dec, &first);
        roundtrip(&mut enc, &mut dec, &second);
        roundtrip(&mut enc, &mut dec, &first);
        roundtrip(&mut enc, &mut dec, &first);
    }

    #[test]
    fn test_repeat_block_is_small() {
        let (mut enc, mut dec) = pair(TableKind::Request, DEFAULT_HEADER_TABLE_SIZE);
        // listed in table order so the whole set carries over unchanged
        let headers = vec![h(":path", "/a"), h(":method", "GET"), h("x-custom", "1")];
        let first = enc.compress(&headers).unwrap();
        assert_eq!(dec.decompress(&first).unwrap(), headers);
        let second = enc.compress(&headers).unwrap();
        assert!(second.is_empty());
        assert_eq!(dec.decompress(&second).unwrap(), headers);
    }

    #[test]
    fn test_order_and_duplicates_preserved() {
        let (mut enc, mut dec) = pair(TableKind::Response, DEFAULT_HEADER_TABLE_SIZE);
        roundtrip(
            &mut enc,
            &mut dec,
            &[h(":status", "200"), h("set-cookie", "a=1"), h("set-cookie", "a=1")],
        );
        roundtrip(
            &mut enc,
            &mut dec,
            &[h("set-cookie", "a=1"), h(":status", "200"), h("set-cookie", "b=2")],
        );
        roundtrip(&mut enc, &mut dec, &[]);
        roundtrip(&mut enc, &mut dec, &[h(":status", "404"), h(":status", "404")]);
    }

    #[test]
    fn test_eviction_keeps_tables_in_sync() {
        let (mut enc, mut dec) = pair(TableKind::Request, 256);
        for i in 0..50 {
            let headers = vec![
                h(":method", "GET"),
                h(":path", &format!("/resource/{}", i)),
                h(&format!("x-header-{}", i % 7), &"v".repeat(i % 13)),
                h("cookie", &format!("session={}", i / 3)),
            ];
            roundtrip(&mut enc, &mut dec, &headers);
            assert!(enc.table().size() <= 256);
            assert_eq!(enc.table().len(), dec.table().len());
        }
    }

    #[test]
    fn test_oversized_header_roundtrip() {
        let (mut enc, mut dec) = pair(TableKind::Request, 128);
        let big = "z".repeat(200);
        let headers = vec![h(":path", "/"), h("x-big", &big), h(":method", "GET")];
        roundtrip(&mut enc, &mut dec, &headers);
        roundtrip(&mut enc, &mut dec, &headers);
        assert!(enc.table().size() <= 128);
    }

    #[test]
    fn test_empty_name_rejected_without_output() {
        let (mut enc, mut dec) = pair(TableKind::Request, DEFAULT_HEADER_TABLE_SIZE);
        let result = enc.compress(&[h(":path", "/"), h("", "x")]);
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
        // the encoder state is unchanged, so the pair stays in sync
        roundtrip(&mut enc, &mut dec, &[h(":path", "/")]);
    }

    #[test]
    fn test_bad_index_is_compression_error() {
        let mut dec = Decoder::new(TableKind::Request, DEFAULT_HEADER_TABLE_SIZE);
        assert!(matches!(dec.decompress(&[0xFF, 0x10]), Err(Error::Compression(_))));
    }

    #[test]
    fn test_dispose_clears_state() {
        let (mut enc, mut dec) = pair(TableKind::Request, DEFAULT_HEADER_TABLE_SIZE);
        enc.dispose();
        dec.dispose();
        assert!(enc.table().is_empty());
        assert!(dec.table().is_empty());
        assert!(enc.compress(&[h(":path", "/")]).is_err());
        assert!(dec.decompress(&[0x80]).is_err());
    }
}
