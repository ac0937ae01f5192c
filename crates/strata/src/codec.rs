//! Variable-length integer and presence bit-set encoding.
//!
//! Every length, count and integral field value in the record format is written
//! as a little-endian base-128 varint (7 payload bits per byte, high bit set on
//! every byte but the last). Signed values are zig-zag mapped first so that small
//! negative deltas stay short.
//!
//! The presence bit-set of a record is written with the same scheme, treating the
//! bit vector as an arbitrarily wide unsigned integer: bit 0 of the first byte is
//! bit 0 of the set. A bit-set that fits in 63 bits is therefore byte-identical to
//! the varint of its `u64` value.

use crate::error::{Result, StrataError};
use bitvec::prelude::*;
use std::io::Write;

/// Bit vector used for record presence masks.
pub type PresenceBits = BitVec<u64, Lsb0>;

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;

/// Maps a signed value onto an unsigned one so that small magnitudes stay small.
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Returns the number of bytes [`write_var_u64`] emits for `value`.
pub fn var_u64_size(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Returns the number of bytes [`write_var_i64`] emits for `value`.
pub fn var_i64_size(value: i64) -> usize {
    var_u64_size(zigzag_encode(value))
}

/// Writes an unsigned varint.
pub fn write_var_u64<W: Write + ?Sized>(writer: &mut W, mut value: u64) -> Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        let byte = (value as u8) & PAYLOAD_MASK;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | CONTINUATION;
        len += 1;
    }
    writer.write_all(&buf[..len])?;
    Ok(())
}

/// Writes a zig-zag encoded signed varint.
pub fn write_var_i64<W: Write + ?Sized>(writer: &mut W, value: i64) -> Result<()> {
    write_var_u64(writer, zigzag_encode(value))
}

/// Returns the number of bytes [`write_bit_set`] emits for `bits`.
pub fn bit_set_size(bits: &BitSlice<u64, Lsb0>) -> usize {
    match bits.last_one() {
        Some(last) => (last + 1).div_ceil(7),
        None => 1,
    }
}

/// Writes a presence bit-set as a base-128 varint of arbitrary width.
pub fn write_bit_set<W: Write + ?Sized>(writer: &mut W, bits: &BitSlice<u64, Lsb0>) -> Result<()> {
    let groups = bit_set_size(bits);
    for group in 0..groups {
        let start = group * 7;
        let end = (start + 7).min(bits.len());
        let mut byte = 0u8;
        if start < end {
            for (offset, bit) in bits[start..end].iter().by_vals().enumerate() {
                if bit {
                    byte |= 1 << offset;
                }
            }
        }
        if group + 1 < groups {
            byte |= CONTINUATION;
        }
        writer.write_all(&[byte])?;
    }
    Ok(())
}

/// Cursor over an in-memory byte slice.
///
/// All reads are bounds-checked and fail with [`StrataError::Truncated`] instead of
/// panicking on short input.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Creates a reader positioned at `pos`.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Returns true once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(StrataError::Truncated {
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a single signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads `len` bytes, returning a sub-slice of the underlying buffer.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    /// Reads an unsigned varint.
    pub fn read_var_u64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for index in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            let payload = (byte & PAYLOAD_MASK) as u64;
            if index == MAX_VARINT_LEN - 1 && payload > 1 {
                return Err(StrataError::InvalidFormat("varint overflows 64 bits".into()));
            }
            value |= payload << (7 * index);
            if byte & CONTINUATION == 0 {
                return Ok(value);
            }
        }
        Err(StrataError::InvalidFormat("varint longer than 10 bytes".into()))
    }

    /// Reads a zig-zag encoded signed varint.
    pub fn read_var_i64(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_var_u64()?))
    }

    /// Reads an unsigned varint that must fit in a `usize`.
    pub fn read_var_usize(&mut self) -> Result<usize> {
        let value = self.read_var_u64()?;
        usize::try_from(value)
            .map_err(|_| StrataError::InvalidFormat(format!("length {} overflows usize", value)))
    }

    /// Reads a presence bit-set of exactly `len` bits.
    ///
    /// Set bits beyond `len` are a format error.
    pub fn read_bit_set(&mut self, len: usize) -> Result<PresenceBits> {
        let mut bits = PresenceBits::repeat(false, len);
        let mut group = 0usize;
        loop {
            let byte = self.read_u8()?;
            for offset in 0..7 {
                if byte & (1 << offset) == 0 {
                    continue;
                }
                let index = group * 7 + offset;
                if index >= len {
                    return Err(StrataError::InvalidFormat(format!(
                        "presence bit {} set on a record of {} bits",
                        index, len
                    )));
                }
                bits.set(index, true);
            }
            if byte & CONTINUATION == 0 {
                return Ok(bits);
            }
            group += 1;
        }
    }
}
