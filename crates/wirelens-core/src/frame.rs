//! Splitting a buffer into independent top-level messages.
//!
//! Protobuf messages are not self-delimiting, so a capture holding several of
//! them needs an outer framing convention. [`LengthPrefixed`] implements the
//! `[u16 big-endian length][payload]` convention; [`Unframed`] treats the
//! whole buffer as a single message.
//!
//! ## Extensibility
//!
//! The [`Framing`] trait allows other conventions:
//!
//! ```
//! use wirelens_core::frame::{FrameSplit, Framing};
//! use wirelens_core::ByteSpan;
//!
//! /// Frames separated by a zero byte
//! struct ZeroSeparated;
//!
//! impl Framing for ZeroSeparated {
//!     fn split(&self, data: &[u8]) -> FrameSplit {
//!         let mut frames = Vec::new();
//!         let mut start = 0;
//!         for (i, byte) in data.iter().enumerate() {
//!             if *byte == 0 {
//!                 frames.push(ByteSpan::new(start, i));
//!                 start = i + 1;
//!             }
//!         }
//!         FrameSplit::complete(frames)
//!     }
//! }
//! ```

use crate::error::Error;
use crate::span::ByteSpan;
use tracing::{debug, trace};

/// Size of the length prefix used by [`LengthPrefixed`]
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Result of splitting a buffer.
///
/// Frames found before a framing error are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSplit {
    /// Frame payload spans in buffer order
    pub frames: Vec<ByteSpan>,
    /// Why splitting stopped before the end of the buffer, if it did
    pub error: Option<Error>,
}

impl FrameSplit {
    /// A split that consumed the whole buffer
    pub fn complete(frames: Vec<ByteSpan>) -> Self {
        Self {
            frames,
            error: None,
        }
    }

    /// Returns true if the whole buffer was consumed
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into a `Result`, dropping partial frames on error
    pub fn into_result(self) -> crate::Result<Vec<ByteSpan>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.frames),
        }
    }
}

/// Trait for implementing buffer framing conventions
pub trait Framing: Send + Sync {
    /// Split `data` into message spans
    fn split(&self, data: &[u8]) -> FrameSplit;
}

/// `[u16 big-endian length][payload]` repeated to the end of the buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefixed;

impl Framing for LengthPrefixed {
    fn split(&self, data: &[u8]) -> FrameSplit {
        let mut frames = Vec::new();
        let mut position = 0;

        debug!("Splitting {} bytes into length-prefixed frames", data.len());

        while position < data.len() {
            let Some(prefix) = data.get(position..position + LENGTH_PREFIX_LEN) else {
                let error = Error::framing(
                    position,
                    format!(
                        "truncated length prefix: {} trailing byte(s)",
                        data.len() - position
                    ),
                );
                debug!("Framing stopped after {} frame(s): {}", frames.len(), error);
                return FrameSplit {
                    frames,
                    error: Some(error),
                };
            };

            let size = usize::from(u16::from_be_bytes([prefix[0], prefix[1]]));
            let begin = position + LENGTH_PREFIX_LEN;
            let end = begin + size;

            if end > data.len() {
                let error = Error::framing(
                    position,
                    format!(
                        "frame declares {} byte(s) but only {} remain",
                        size,
                        data.len() - begin
                    ),
                );
                debug!("Framing stopped after {} frame(s): {}", frames.len(), error);
                return FrameSplit {
                    frames,
                    error: Some(error),
                };
            }

            trace!("Frame {} at {}..{}", frames.len(), begin, end);
            frames.push(ByteSpan::new(begin, end));
            position = end;
        }

        debug!("Found {} frame(s)", frames.len());
        FrameSplit::complete(frames)
    }
}

/// The whole buffer is one message
#[derive(Debug, Clone, Copy, Default)]
pub struct Unframed;

impl Framing for Unframed {
    fn split(&self, data: &[u8]) -> FrameSplit {
        FrameSplit::complete(vec![ByteSpan::new(0, data.len())])
    }
}

/// Split a buffer with the default `u16` length-prefix convention
pub fn split_frames(data: &[u8]) -> FrameSplit {
    LengthPrefixed.split(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_two_frames() {
        let data = [0x00, 0x02, 0x08, 0x01, 0x00, 0x02, 0x08, 0x01];
        let split = split_frames(&data);
        assert!(split.is_complete());
        assert_eq!(
            split.frames,
            vec![ByteSpan::new(2, 4), ByteSpan::new(6, 8)]
        );
    }

    #[test]
    fn test_roundtrip_preserves_payloads() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x08, 0x96, 0x01],
            (0..=255).collect(),
            vec![0xAB; 1000],
            vec![0x00],
        ];
        let data: Vec<u8> = payloads.iter().flat_map(|p| frame(p)).collect();

        let spans = split_frames(&data).into_result().unwrap();
        assert_eq!(spans.len(), payloads.len());
        for (span, payload) in spans.iter().zip(&payloads) {
            assert_eq!(span.slice(&data).unwrap(), payload.as_slice());
        }
    }

    #[test]
    fn test_max_size_frame() {
        let payload = vec![0x55; u16::MAX as usize];
        let data = frame(&payload);
        let split = split_frames(&data);
        assert!(split.is_complete());
        assert_eq!(split.frames[0].len(), u16::MAX as usize);
    }

    #[test]
    fn test_empty_buffer() {
        let split = split_frames(&[]);
        assert!(split.is_complete());
        assert!(split.frames.is_empty());
    }

    #[test]
    fn test_trailing_partial_prefix() {
        let mut data = frame(&[0x08, 0x01]);
        data.push(0x00);
        let split = split_frames(&data);
        assert_eq!(split.frames, vec![ByteSpan::new(2, 4)]);
        assert!(matches!(split.error, Some(Error::Framing { offset: 4, .. })));
    }

    #[test]
    fn test_overrunning_payload() {
        let mut data = frame(&[0x08, 0x01]);
        data.extend_from_slice(&[0x00, 0x05, 0x08]);
        let split = split_frames(&data);
        assert_eq!(split.frames.len(), 1);
        assert!(matches!(split.error, Some(Error::Framing { offset: 4, .. })));
        assert!(split.into_result().is_err());
    }

    #[test]
    fn test_unframed() {
        let split = Unframed.split(&[0x08, 0x01]);
        assert_eq!(split.frames, vec![ByteSpan::new(0, 2)]);
    }
}
