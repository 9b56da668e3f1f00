use crate::error::{BadMagicSnafu, Field, FormatError, TruncatedSnafu};
use std::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

type Result<T, E = FormatError> = std::result::Result<T, E>;

/// Magic byte at offset 0 of every image.
pub const IMAGE_MAGIC: u8 = 0xE9;

/// Size of the fixed header plus the extension header.
pub const HEADER_SIZE: usize = size_of::<ImageHeaderRaw>();

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ImageHeaderRaw {
    pub magic: u8,           // 0x00 - 0xE9
    pub segment_count: u8,   // 0x01
    pub tail: [u8; 6],       // 0x02 - flash mode, flash config, entry point
    pub extension: [u8; 16], // 0x08 - extended header
                             // 0x18 - first segment
}

/// Parsed image header.
///
/// Only the magic and the segment count are interpreted; all other bytes are
/// kept verbatim.
#[derive(Clone, Copy)]
#[must_use]
pub struct ImageHeader {
    raw_header: ImageHeaderRaw,
}

impl ImageHeader {
    /// Parses an image header from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Truncated`] if the data is shorter than
    /// [`HEADER_SIZE`] and [`FormatError::BadMagic`] if the first byte is not
    /// [`IMAGE_MAGIC`].
    pub fn read(image: &[u8]) -> Result<Self> {
        let (raw_header, _) = ImageHeaderRaw::read_from_prefix(image).map_err(|_| {
            TruncatedSnafu {
                field: Field::Header,
                offset: 0usize,
                needed: HEADER_SIZE,
                available: image.len(),
            }
            .build()
        })?;

        snafu::ensure!(
            raw_header.magic == IMAGE_MAGIC,
            BadMagicSnafu {
                found: raw_header.magic
            }
        );

        Ok(Self { raw_header })
    }

    /// Returns the magic byte.
    #[must_use]
    pub const fn magic(&self) -> u8 {
        self.raw_header.magic
    }

    /// Returns the number of segments that follow the header.
    #[must_use]
    pub const fn segment_count(&self) -> usize {
        self.raw_header.segment_count as _
    }

    /// Returns bytes 2..8 of the header.
    #[must_use]
    pub const fn header_tail(&self) -> &[u8; 6] {
        &self.raw_header.tail
    }

    /// Returns the 16-byte extension header.
    #[must_use]
    pub const fn extension(&self) -> &[u8; 16] {
        &self.raw_header.extension
    }

    /// Returns the header exactly as it appears in the image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.raw_header.as_bytes()
    }

    /// Returns the raw header.
    #[must_use]
    pub const fn raw_header(&self) -> &ImageHeaderRaw {
        &self.raw_header
    }
}

impl fmt::Debug for ImageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHeader")
            .field("magic", &format_args!("0x{:02X}", self.magic()))
            .field("segment_count", &self.segment_count())
            .field("header_tail", self.header_tail())
            .field("extension", self.extension())
            .finish()
    }
}
