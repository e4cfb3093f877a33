//! Bit-field helpers for frame preambles and payloads
//!
//! All multi-byte fields are big-endian. Fields narrower than their storage
//! (5, 15, 24 and 31 bits) leave the surrounding bits untouched on write and
//! ignore them on read. Values that do not fit are rejected, never truncated.

use super::error::{Error, Result};

/// Set or clear bit `index` (0 = least significant) of `value`
///
/// # Panics
///
/// Panics if `index` is not below 8.
pub fn set_bit(value: u8, on: bool, index: u8) -> u8 {
    assert!(index < 8, "bit index {} out of range for u8", index);
    if on {
        value | (1 << index)
    } else {
        value & !(1 << index)
    }
}

/// Read bit `index` (0 = least significant) of `value`
///
/// # Panics
///
/// Panics if `index` is not below 8.
pub fn get_bit(value: u8, index: u8) -> bool {
    assert!(index < 8, "bit index {} out of range for u8", index);
    value & (1 << index) != 0
}

fn check_len(buf: &[u8], offset: usize, width: usize) -> Result<()> {
    let needed = offset.checked_add(width).ok_or(Error::BufferTooShort {
        needed: usize::MAX,
        available: buf.len(),
    })?;
    if buf.len() < needed {
        return Err(Error::BufferTooShort {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn check_value(value: u64, bits: u32) -> Result<()> {
    if bits < 64 && value >> bits != 0 {
        return Err(Error::FieldOutOfRange { value, bits });
    }
    Ok(())
}

/// Low 5 bits of the byte at `offset`
pub fn get_u5(buf: &[u8], offset: usize) -> Result<u8> {
    check_len(buf, offset, 1)?;
    Ok(buf[offset] & 0x1F)
}

/// Write the low 5 bits of the byte at `offset`, keeping the top 3
pub fn set_u5(buf: &mut [u8], offset: usize, value: u8) -> Result<()> {
    check_len(buf, offset, 1)?;
    check_value(value as u64, 5)?;
    buf[offset] = (buf[offset] & 0xE0) | value;
    Ok(())
}

pub fn get_u8(buf: &[u8], offset: usize) -> Result<u8> {
    check_len(buf, offset, 1)?;
    Ok(buf[offset])
}

pub fn set_u8(buf: &mut [u8], offset: usize, value: u8) -> Result<()> {
    check_len(buf, offset, 1)?;
    buf[offset] = value;
    Ok(())
}

/// 15-bit field behind a reserved high bit
pub fn get_u15(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(get_u16(buf, offset)? & 0x7FFF)
}

pub fn set_u15(buf: &mut [u8], offset: usize, value: u16) -> Result<()> {
    check_len(buf, offset, 2)?;
    check_value(value as u64, 15)?;
    let reserved = buf[offset] & 0x80;
    set_u16(buf, offset, value)?;
    buf[offset] |= reserved;
    Ok(())
}

pub fn get_u16(buf: &[u8], offset: usize) -> Result<u16> {
    check_len(buf, offset, 2)?;
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

pub fn set_u16(buf: &mut [u8], offset: usize, value: u16) -> Result<()> {
    check_len(buf, offset, 2)?;
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    Ok(())
}

pub fn get_u24(buf: &[u8], offset: usize) -> Result<u32> {
    check_len(buf, offset, 3)?;
    Ok(((buf[offset] as u32) << 16) | ((buf[offset + 1] as u32) << 8) | buf[offset + 2] as u32)
}

pub fn set_u24(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    check_len(buf, offset, 3)?;
    check_value(value as u64, 24)?;
    buf[offset] = (value >> 16) as u8;
    buf[offset + 1] = (value >> 8) as u8;
    buf[offset + 2] = value as u8;
    Ok(())
}

/// 31-bit field behind a reserved high bit (stream ids, window deltas)
pub fn get_u31(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(get_u32(buf, offset)? & 0x7FFF_FFFF)
}

pub fn set_u31(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    check_len(buf, offset, 4)?;
    check_value(value as u64, 31)?;
    let reserved = buf[offset] & 0x80;
    set_u32(buf, offset, value)?;
    buf[offset] |= reserved;
    Ok(())
}

pub fn get_u32(buf: &[u8], offset: usize) -> Result<u32> {
    check_len(buf, offset, 4)?;
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

pub fn set_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    check_len(buf, offset, 4)?;
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    Ok(())
}
