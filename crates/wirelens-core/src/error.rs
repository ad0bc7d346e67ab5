//! Error types for the wirelens-core library.
//!
//! Every variant carries the absolute byte offset into the inspected buffer
//! where decoding stopped. Decode errors are reported next to whatever partial
//! structure was recovered rather than discarding it, see
//! [`Message::error`](crate::Message::error).

use prost_reflect::DescriptorError;
use thiserror::Error;

/// Result type alias for wirelens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all wirelens operations
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A read ran past the end of the current message range
    #[error("read past end of range at offset {offset}: needed {needed} byte(s), {available} available")]
    OutOfRange {
        /// Byte offset where the read started
        offset: usize,
        /// Number of bytes the read required
        needed: usize,
        /// Number of bytes left before the range end
        available: usize,
    },

    /// Wire type 3/4 (legacy groups) or a value above 5
    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType {
        /// Offset of the tag carrying the wire type
        offset: usize,
        /// The raw wire type bits
        wire_type: u8,
    },

    /// A varint did not terminate within 128 bits
    #[error("varint at offset {offset} exceeds {max_bits} bits")]
    VarintOverflow {
        /// Offset of the first varint byte
        offset: usize,
        /// Maximum supported width in bits
        max_bits: u32,
    },

    /// Field number zero or too wide for `u32`
    #[error("invalid field number {number} at offset {offset}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// Offset of the tag
        offset: usize,
        /// The decoded field number, saturated to `u64`
        number: u64,
        /// Largest accepted field number
        max: u32,
    },

    /// Nested message recursion went past the configured limit
    #[error("nesting depth {depth} at offset {offset} exceeds limit of {limit}")]
    DepthExceeded {
        /// Offset of the nested message
        offset: usize,
        /// Depth the nested message would have had
        depth: usize,
        /// Configured maximum depth
        limit: usize,
    },

    /// Length-prefixed framing could not be split exactly
    #[error("framing error at offset {offset}: {details}")]
    Framing {
        /// Offset of the offending length prefix
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Inferred schemas could not be turned into a descriptor pool
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// Bytes could not be decoded against an inferred descriptor
    #[error("failed to decode against inferred descriptor: {0}")]
    DescriptorDecode(#[from] prost::DecodeError),
}

impl Error {
    /// Creates a new out-of-range error
    pub fn out_of_range(offset: usize, needed: usize, available: usize) -> Self {
        Self::OutOfRange {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new unsupported wire type error
    pub fn unsupported_wire_type(offset: usize, wire_type: u8) -> Self {
        Self::UnsupportedWireType { offset, wire_type }
    }

    /// Creates a new framing error
    pub fn framing(offset: usize, details: impl Into<String>) -> Self {
        Self::Framing {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Byte offset the error refers to, if any
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::OutOfRange { offset, .. }
            | Self::UnsupportedWireType { offset, .. }
            | Self::VarintOverflow { offset, .. }
            | Self::InvalidFieldNumber { offset, .. }
            | Self::DepthExceeded { offset, .. }
            | Self::Framing { offset, .. } => Some(*offset),
            Self::DescriptorBuild(_) | Self::DescriptorDecode(_) => None,
        }
    }

    /// Returns true for errors produced while walking wire data, which leave
    /// a usable partial result behind
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::DescriptorBuild(_) | Self::DescriptorDecode(_))
    }
}

impl From<DescriptorError> for Error {
    fn from(err: DescriptorError) -> Self {
        Self::DescriptorBuild(err.to_string())
    }
}
