use snafu::Snafu;
use std::fmt;

/// Structural errors when reading a firmware image.
///
/// Every variant identifies where parsing stopped so a malformed image can be
/// inspected with a hex editor.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum FormatError {
    #[snafu(display("invalid image magic 0x{found:02X} at offset 0 (expected 0xE9)"))]
    BadMagic { found: u8 },

    #[snafu(display(
        "{field} at offset 0x{offset:X} is truncated (needs {needed} bytes, {available} available)"
    ))]
    Truncated {
        field: Field,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[snafu(display("image is too short ({len} bytes, at least {min} required)"))]
    TooShort { len: usize, min: usize },
}

impl FormatError {
    /// Returns the absolute offset where the error was detected.
    #[must_use]
    pub const fn offset(&self) -> usize {
        match self {
            Self::BadMagic { .. } | Self::TooShort { .. } => 0,
            Self::Truncated { offset, .. } => *offset,
        }
    }
}

/// The part of the image a [`FormatError::Truncated`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The fixed 24-byte header (including the extension header).
    Header,
    /// The 8-byte load address/length descriptor of a segment.
    SegmentHeader { index: usize },
    /// The payload of a segment.
    SegmentData { index: usize },
    /// The checksum byte and the digest trailer after the last segment.
    Checksum,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => f.write_str("image header"),
            Self::SegmentHeader { index } => write!(f, "header of segment #{index}"),
            Self::SegmentData { index } => write!(f, "data of segment #{index}"),
            Self::Checksum => f.write_str("checksum and digest trailer"),
        }
    }
}
