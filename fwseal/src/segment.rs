use crate::error::{Field, FormatError, TruncatedSnafu};
use crate::header::HEADER_SIZE;
use std::ops::Range;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub(crate) struct SegmentHeaderRaw {
    load_address: U32,
    data_length: U32,
}

/// Size of the descriptor in front of each segment.
pub const SEGMENT_HEADER_SIZE: usize = size_of::<SegmentHeaderRaw>();

/// A segment borrowed from an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Segment<'a> {
    index: usize,
    offset: usize,
    load_address: u32,
    data: &'a [u8],
}

impl<'a> Segment<'a> {
    /// Returns the position of this segment in the image, starting at zero.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the offset of the segment descriptor within the image.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the address the bootloader loads this segment to.
    #[must_use]
    pub const fn load_address(&self) -> u32 {
        self.load_address
    }

    /// Returns the offset of the first data byte within the image.
    #[must_use]
    pub const fn data_offset(&self) -> usize {
        self.offset + SEGMENT_HEADER_SIZE
    }

    /// Returns the offset one past the last data byte.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.data_offset() + self.data.len()
    }

    /// Returns the range of the segment data within the image.
    #[must_use]
    pub const fn data_range(&self) -> Range<usize> {
        self.data_offset()..self.end()
    }

    /// Returns the segment payload.
    #[must_use]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the segment has no payload.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Iterator over the segments of an image.
///
/// Segments are read back to back starting right after the header. The walk
/// stops at the first malformed segment; after an error the iterator yields
/// nothing more.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Segments<'a> {
    raw: &'a [u8],
    offset: usize,
    current: usize,
    total: usize,
}

impl<'a> Segments<'a> {
    /// Creates a walker over `total` segments of `image`.
    ///
    /// The header is not validated here; see [`crate::header::ImageHeader`].
    pub fn new(image: &'a [u8], total: usize) -> Self {
        Self {
            raw: image,
            offset: HEADER_SIZE,
            current: 0,
            total,
        }
    }

    /// Returns the offset of the next segment descriptor.
    ///
    /// Once every segment has been read this is the end of the last segment.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    fn read_segment(&mut self, index: usize) -> Result<Segment<'a>, FormatError> {
        let offset = self.offset;
        let available = self.raw.len().saturating_sub(offset);

        let (raw, _) = self
            .raw
            .get(offset..)
            .and_then(|rest| SegmentHeaderRaw::read_from_prefix(rest).ok())
            .ok_or_else(|| {
                TruncatedSnafu {
                    field: Field::SegmentHeader { index },
                    offset,
                    needed: SEGMENT_HEADER_SIZE,
                    available,
                }
                .build()
            })?;

        let data_offset = offset + SEGMENT_HEADER_SIZE;
        let length = raw.data_length.get() as usize;
        let data = data_offset
            .checked_add(length)
            .and_then(|end| self.raw.get(data_offset..end))
            .ok_or_else(|| {
                TruncatedSnafu {
                    field: Field::SegmentData { index },
                    offset: data_offset,
                    needed: length,
                    available: self.raw.len() - data_offset,
                }
                .build()
            })?;

        log::trace!(
            "segment #{index} at 0x{offset:X}: load_address=0x{:08X}, data_len={length}",
            raw.load_address.get()
        );

        self.offset = data_offset + length;

        Ok(Segment {
            index,
            offset,
            load_address: raw.load_address.get(),
            data,
        })
    }
}

impl std::fmt::Debug for Segments<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segments")
            .field("offset", &self.offset)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<Segment<'a>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }

        let index = self.current;
        let result = self.read_segment(index);

        // Later segments start where this one ends, so there is nothing to
        // resume from after a failure.
        self.current = if result.is_ok() { index + 1 } else { self.total };

        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.current;
        (0, Some(remaining))
    }
}

impl std::iter::FusedIterator for Segments<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(segments: &[(u32, &[u8])]) -> Vec<u8> {
        let mut data = vec![0xE9, segments.len() as u8];
        data.resize(HEADER_SIZE, 0);
        for (addr, payload) in segments {
            data.extend(addr.to_le_bytes());
            data.extend((payload.len() as u32).to_le_bytes());
            data.extend(*payload);
        }
        data
    }

    #[test]
    fn walks_segments_in_file_order() {
        let data = image(&[(0x4000_0000, &[1, 2, 3]), (0x3FF0_0000, &[]), (0x10, &[9])]);
        let mut walker = Segments::new(&data, 3);

        let first = walker.next().unwrap().unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(first.offset(), 24);
        assert_eq!(first.load_address(), 0x4000_0000);
        assert_eq!(first.data(), &[1, 2, 3]);
        assert_eq!(first.data_range(), 32..35);

        let second = walker.next().unwrap().unwrap();
        assert_eq!(second.offset(), 35);
        assert!(second.is_empty());

        let third = walker.next().unwrap().unwrap();
        assert_eq!(third.offset(), 43);
        assert_eq!(third.data(), &[9]);
        assert_eq!(third.end(), 52);

        assert!(walker.next().is_none());
        assert_eq!(walker.offset(), data.len());
    }

    #[test]
    fn reports_truncated_descriptor() {
        let mut data = image(&[(0, &[1, 2])]);
        data.extend([0u8; 5]);

        let err = Segments::new(&data, 2)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();

        assert_eq!(
            err,
            FormatError::Truncated {
                field: Field::SegmentHeader { index: 1 },
                offset: 34,
                needed: 8,
                available: 5,
            }
        );
    }

    #[test]
    fn reports_truncated_data() {
        let data = image(&[(0, &[1, 2, 3, 4])]);

        let err = Segments::new(&data[..data.len() - 1], 1)
            .next()
            .unwrap()
            .unwrap_err();

        assert_eq!(
            err,
            FormatError::Truncated {
                field: Field::SegmentData { index: 0 },
                offset: 32,
                needed: 4,
                available: 3,
            }
        );
    }

    #[test]
    fn huge_length_does_not_overflow() {
        let mut data = vec![0xE9, 1];
        data.resize(HEADER_SIZE, 0);
        data.extend(0u32.to_le_bytes());
        data.extend(u32::MAX.to_le_bytes());

        let err = Segments::new(&data, 1).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            FormatError::Truncated {
                field: Field::SegmentData { index: 0 },
                ..
            }
        ));
    }

    #[test]
    fn stops_after_first_error() {
        let data = image(&[]);
        let mut walker = Segments::new(&data, 4);

        assert!(walker.next().unwrap().is_err());
        assert!(walker.next().is_none());
    }
}
