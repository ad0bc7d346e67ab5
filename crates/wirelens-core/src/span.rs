//! Byte provenance for decoded values.

use std::fmt;
use std::ops::Range;

/// Half-open range `[begin, end)` of absolute offsets into the inspected buffer.
///
/// Offsets are absolute even for fields of nested messages, so any span can be
/// sliced directly out of the buffer handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteSpan {
    /// First byte covered (inclusive)
    pub begin: usize,
    /// One past the last byte covered (exclusive)
    pub end: usize,
}

impl ByteSpan {
    /// Creates a new span; `end` is clamped so it never precedes `begin`
    pub fn new(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end: end.max(begin),
        }
    }

    /// Number of bytes covered
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Returns true if the span covers no bytes
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Returns true if `offset` falls inside the span
    pub fn contains(&self, offset: usize) -> bool {
        self.begin <= offset && offset < self.end
    }

    /// Returns true if `other` lies entirely within this span
    pub fn encloses(&self, other: &ByteSpan) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Borrow the covered bytes from the backing buffer.
    ///
    /// Returns `None` if the span does not fit the buffer, which only happens
    /// when the span is applied to a different buffer than it was decoded from.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.begin..self.end)
    }
}

impl From<ByteSpan> for Range<usize> {
    fn from(span: ByteSpan) -> Self {
        span.begin..span.end
    }
}

impl From<Range<usize>> for ByteSpan {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl fmt::Display for ByteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}
