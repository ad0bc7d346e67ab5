//! Low-level protobuf wire format reading.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: legacy group delimiters, recognised but never decoded
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! Varints are accumulated into a `u128`. Anything wider than 128 bits, or
//! longer than [`MAX_VARINT_LEN`] groups, is rejected with
//! [`Error::VarintOverflow`].

use crate::error::{Error, Result};
use crate::span::ByteSpan;
use std::fmt;

/// Largest field number a `.proto` definition may declare (2^29 - 1)
///
/// Wire data is not held to this bound; only descriptor export is.
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Field numbers protobuf reserves for its own implementation
pub const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<u32> = 19_000..=19_999;

/// Widest varint accepted, in bits
pub const MAX_VARINT_BITS: u32 = 128;

/// Maximum number of base-128 groups in an accepted varint
pub const MAX_VARINT_LEN: usize = 19;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width, read as a double
    Fixed64 = 1,
    /// Length-delimited, decoded as a nested message
    LengthDelimited = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width, read as a float
    Fixed32 = 5,
}

impl WireType {
    /// Interpret the low three bits of a tag, reporting `offset` on failure
    pub fn from_bits(bits: u8, offset: usize) -> Result<Self> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(Error::unsupported_wire_type(offset, bits)),
        }
    }

    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "double",
            WireType::LengthDelimited => "length-delimited",
            WireType::StartGroup => "start-group",
            WireType::EndGroup => "end-group",
            WireType::Fixed32 => "float",
        }
    }

    /// Raw wire type bits
    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        WireType::from_bits(value, 0)
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded field tag.
///
/// The wire type is kept as raw bits; validity is checked when the value is
/// read, so a tag carrying wire type 6 or 7 still decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number, never zero
    pub field_id: u32,
    /// Low three bits of the tag
    pub wire_bits: u8,
}

/// Bounds-checked sequential reader over `[position, end)` of a buffer.
///
/// Positions are absolute offsets into the backing buffer so spans recorded
/// by nested readers line up with the outermost one.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor over the whole buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            end: data.len(),
        }
    }

    /// Creates a cursor restricted to `span`, clamped to the buffer
    pub fn with_span(data: &'a [u8], span: ByteSpan) -> Self {
        let end = span.end.min(data.len());
        Self {
            data,
            position: span.begin.min(end),
            end,
        }
    }

    /// Current absolute offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Absolute offset one past the last readable byte
    pub fn end(&self) -> usize {
        self.end
    }

    /// Bytes left before the end
    pub fn remaining(&self) -> usize {
        self.end - self.position
    }

    /// Returns true while the position is before the end
    pub fn has_more(&self) -> bool {
        self.position < self.end
    }

    /// Read a single byte
    pub fn read_byte(&mut self) -> Result<u8> {
        if !self.has_more() {
            return Err(Error::out_of_range(self.position, 1, 0));
        }
        let byte = self.data[self.position];
        self.position += 1;
        Ok(byte)
    }

    /// Read exactly `N` bytes, consuming nothing if fewer remain
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.remaining() < N {
            return Err(Error::out_of_range(self.position, N, self.remaining()));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.position..self.position + N]);
        self.position += N;
        Ok(out)
    }

    /// Advance by `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(Error::out_of_range(self.position, len, self.remaining()));
        }
        self.position += len;
        Ok(())
    }

    /// Decode a base-128 varint, least-significant group first
    pub fn read_varint(&mut self) -> Result<u128> {
        let start = self.position;
        let mut result: u128 = 0;

        for group in 0..MAX_VARINT_LEN {
            let byte = self.read_byte()?;
            let digit = u128::from(byte & 0x7F);
            let shift = 7 * group as u32;
            let shifted = digit << shift;

            // Bits pushed past the top of the u128
            if shifted >> shift != digit {
                return Err(Error::VarintOverflow {
                    offset: start,
                    max_bits: MAX_VARINT_BITS,
                });
            }
            result |= shifted;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }

        Err(Error::VarintOverflow {
            offset: start,
            max_bits: MAX_VARINT_BITS,
        })
    }

    /// Decode a tag varint and validate its field number
    pub fn read_tag(&mut self) -> Result<Tag> {
        let start = self.position;
        let tag = self.read_varint()?;
        let field_number = tag >> 3;

        let field_id = match u32::try_from(field_number) {
            Ok(id) if id != 0 => id,
            _ => {
                return Err(Error::InvalidFieldNumber {
                    offset: start,
                    number: u64::try_from(field_number).unwrap_or(u64::MAX),
                    max: u32::MAX,
                })
            }
        };

        Ok(Tag {
            field_id,
            wire_bits: (tag & 0x07) as u8,
        })
    }

    /// Read a varint length prefix and check it fits in the remaining range
    pub fn read_length(&mut self) -> Result<usize> {
        let length = self.read_varint()?;
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        if length > self.remaining() {
            return Err(Error::out_of_range(self.position, length, self.remaining()));
        }
        Ok(length)
    }

    /// Read 8 little-endian bytes as an IEEE-754 double
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_array::<8>().map(f64::from_le_bytes)
    }

    /// Read 4 little-endian bytes as an IEEE-754 single
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_array::<4>().map(f32::from_le_bytes)
    }
}

/// Encode a varint; used by tests to build fixtures wider than 64 bits
#[cfg(test)]
pub(crate) fn encode_varint(mut value: u128) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}
