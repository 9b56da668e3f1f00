use crate::checksum::compute_checksum;
use crate::digest::{DIGEST_LEN, ImageDigest, compute_digest};
use crate::error::{Field, FormatError, TooShortSnafu, TruncatedSnafu};
use crate::header::ImageHeader;
use crate::segment::{Segment, Segments};
use std::fmt;
use std::ops::Range;

/// A firmware image whose header, segments and trailer have been validated.
///
/// The image is generic over its backing storage so it can wrap an owned
/// buffer, a borrowed slice or a memory-mapped file.
#[must_use]
pub struct ParsedImage<R: AsRef<[u8]>> {
    raw: R,
    header: ImageHeader,
    segments_end: usize,
}

impl<R: AsRef<[u8]>> fmt::Debug for ParsedImage<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedImage")
            .field("header", &self.header)
            .field("len", &self.len())
            .field("segments_end", &self.segments_end)
            .finish_non_exhaustive()
    }
}

/// Parses and validates the layout of an image.
///
/// # Errors
///
/// Returns [`FormatError::Truncated`] when the header, any segment or the
/// checksum/digest trailer does not fit in the buffer,
/// [`FormatError::TooShort`] when a valid header is followed by less than a
/// digest's worth of image and [`FormatError::BadMagic`] when the magic byte
/// is wrong.
pub fn parse<R: AsRef<[u8]>>(raw: R) -> Result<ParsedImage<R>, FormatError> {
    ParsedImage::new(raw)
}

impl<R: AsRef<[u8]>> ParsedImage<R> {
    /// Creates a new [`ParsedImage`] from raw bytes. See [`parse()`].
    pub fn new(raw: R) -> Result<Self, FormatError> {
        let data = raw.as_ref();
        let header = ImageHeader::read(data)?;
        snafu::ensure!(
            data.len() >= DIGEST_LEN,
            TooShortSnafu {
                len: data.len(),
                min: DIGEST_LEN,
            }
        );

        let mut segments = Segments::new(data, header.segment_count());
        segments.by_ref().try_for_each(|segment| segment.map(drop))?;
        let segments_end = segments.offset();

        // One checksum byte and the digest must follow the last segment.
        let needed = 1 + DIGEST_LEN;
        let available = data.len() - segments_end;
        snafu::ensure!(
            available >= needed,
            TruncatedSnafu {
                field: Field::Checksum,
                offset: segments_end,
                needed,
                available,
            }
        );

        log::debug!(
            "parsed image: {} bytes, {} segments ending at 0x{segments_end:X}",
            data.len(),
            header.segment_count()
        );

        Ok(Self {
            raw,
            header,
            segments_end,
        })
    }

    /// Returns the image header.
    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.header.segment_count()
    }

    /// Returns an iterator over the segments.
    ///
    /// The layout was validated when the image was parsed, so the walk cannot
    /// fail.
    pub fn segments(&self) -> impl ExactSizeIterator<Item = Segment<'_>> + '_ {
        let mut walker = Segments::new(self.as_bytes(), self.segment_count());
        (0..self.segment_count()).map(move |_| match walker.next() {
            Some(Ok(segment)) => segment,
            _ => unreachable!(),
        })
    }

    /// Returns the data range of every segment, in file order.
    #[must_use]
    pub fn segment_ranges(&self) -> Vec<Range<usize>> {
        self.segments().map(|s| s.data_range()).collect()
    }

    /// Returns the offset one past the last segment.
    #[must_use]
    pub fn segments_end(&self) -> usize {
        self.segments_end
    }

    /// Returns the total image size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Always `false`; a parsed image holds at least a header and trailer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the offset of the digest trailer.
    #[must_use]
    pub fn trailer_start(&self) -> usize {
        self.len() - DIGEST_LEN
    }

    /// Returns the offset of the checksum byte.
    #[must_use]
    pub fn checksum_offset(&self) -> usize {
        self.trailer_start() - 1
    }

    /// Returns the checksum currently stored in the image.
    #[must_use]
    pub fn stored_checksum(&self) -> u8 {
        self.as_bytes()[self.checksum_offset()]
    }

    /// Returns the digest currently stored in the image.
    #[must_use]
    pub fn stored_digest(&self) -> ImageDigest {
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&self.as_bytes()[self.trailer_start()..]);
        digest
    }

    /// Computes the checksum from the current segment data.
    #[must_use]
    pub fn computed_checksum(&self) -> u8 {
        let segments: Vec<_> = self.segments().collect();
        compute_checksum(&segments)
    }

    /// Computes the digest over the current bytes in front of the trailer.
    #[must_use]
    pub fn computed_digest(&self) -> ImageDigest {
        // The image is at least one header plus trailer long.
        compute_digest(self.as_bytes()).unwrap_or_default()
    }

    /// Compares the stored checksum and digest against recomputed values.
    pub fn verify(&self) -> Verification {
        let verification = Verification {
            stored_checksum: self.stored_checksum(),
            computed_checksum: self.computed_checksum(),
            stored_digest: self.stored_digest(),
            computed_digest: self.computed_digest(),
        };

        log::debug!("verification: {}", verification.findings());

        verification
    }

    /// Returns the raw image bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.raw.as_ref()
    }

    /// Returns the backing storage.
    pub fn into_inner(self) -> R {
        self.raw
    }
}

impl<R: AsRef<[u8]> + AsMut<[u8]>> ParsedImage<R> {
    /// Returns the payload of segment `index` for editing.
    ///
    /// Only payload bytes are exposed so edits cannot change the layout. Call
    /// [`ParsedImage::reseal()`] afterwards to fix the checksum and digest.
    pub fn segment_data_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let range = self.segments().nth(index)?.data_range();
        self.raw.as_mut().get_mut(range)
    }

    pub(crate) fn raw_mut(&mut self) -> &mut [u8] {
        self.raw.as_mut()
    }
}

/// Result of comparing an image's integrity fields against recomputed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Verification {
    pub stored_checksum: u8,
    pub computed_checksum: u8,
    pub stored_digest: ImageDigest,
    pub computed_digest: ImageDigest,
}

impl Verification {
    #[must_use]
    pub fn checksum_matches(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }

    #[must_use]
    pub fn digest_matches(&self) -> bool {
        self.stored_digest == self.computed_digest
    }

    /// Returns `true` if neither the checksum nor the digest is stale.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.findings().is_empty()
    }

    pub fn findings(&self) -> Findings {
        let mut findings = Findings::empty();
        findings.set(Findings::CHECKSUM_MISMATCH, !self.checksum_matches());
        findings.set(Findings::DIGEST_MISMATCH, !self.digest_matches());
        findings
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = |ok: bool| if ok { "ok" } else { "MISMATCH" };

        writeln!(
            f,
            "Checksum: stored 0x{:02X}, computed 0x{:02X} ({})",
            self.stored_checksum,
            self.computed_checksum,
            status(self.checksum_matches())
        )?;
        writeln!(f, "Digest:   stored   {}", hex::encode(self.stored_digest))?;
        write!(
            f,
            "          computed {} ({})",
            hex::encode(self.computed_digest),
            status(self.digest_matches())
        )
    }
}

/// Set of problems found by [`ParsedImage::verify()`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Findings(u8);

bitflags::bitflags! {
    impl Findings: u8 {
        const CHECKSUM_MISMATCH = 0x01;
        const DIGEST_MISMATCH = 0x02;
    }
}

impl fmt::Display for Findings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "consistent");
        }

        let mut first = true;
        let mut write_flag = |name: &str| -> fmt::Result {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", name)
        };

        if self.contains(Self::CHECKSUM_MISMATCH) {
            write_flag("checksum mismatch")?;
        }
        if self.contains(Self::DIGEST_MISMATCH) {
            write_flag("digest mismatch")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header, one segment `[0x01, 0x02]`, checksum slot and zeroed trailer.
    fn unsealed() -> Vec<u8> {
        let mut data = vec![0xE9, 0x01];
        data.resize(24, 0);
        data.extend(0u32.to_le_bytes());
        data.extend(2u32.to_le_bytes());
        data.extend([0x01, 0x02]);
        data.push(0x00);
        data.extend([0u8; 32]);
        data
    }

    #[test]
    fn locates_integrity_fields() {
        let image = parse(unsealed()).unwrap();

        assert_eq!(image.len(), 67);
        assert_eq!(image.segments_end(), 34);
        assert_eq!(image.checksum_offset(), 34);
        assert_eq!(image.trailer_start(), 35);
        assert_eq!(image.segment_ranges(), vec![32..34]);
        assert_eq!(image.segments().len(), 1);
    }

    #[test]
    fn reports_stale_fields_as_findings() {
        let image = parse(unsealed()).unwrap();
        let verification = image.verify();

        assert_eq!(verification.computed_checksum, 0xEC);
        assert_eq!(verification.stored_checksum, 0x00);
        assert_eq!(
            verification.findings(),
            Findings::CHECKSUM_MISMATCH | Findings::DIGEST_MISMATCH
        );
        assert!(!verification.is_consistent());
        assert_eq!(
            verification.findings().to_string(),
            "checksum mismatch, digest mismatch"
        );
    }

    #[test]
    fn padding_before_checksum_is_allowed() {
        let mut data = unsealed();
        data.splice(34..34, [0u8; 15]);

        let image = parse(data).unwrap();
        assert_eq!(image.segments_end(), 34);
        assert_eq!(image.checksum_offset(), 49);
    }

    #[test]
    fn requires_room_for_trailer() {
        let data = unsealed();
        let err = parse(&data[..66]).unwrap_err();

        assert_eq!(
            err,
            FormatError::Truncated {
                field: Field::Checksum,
                offset: 34,
                needed: 33,
                available: 32,
            }
        );
    }

    #[test]
    fn header_shorter_than_digest() {
        let data = unsealed();
        let err = parse(&data[..30]).unwrap_err();

        assert_eq!(err, FormatError::TooShort { len: 30, min: 32 });
    }

    #[test]
    fn consistent_image_has_no_findings() {
        let mut data = unsealed();
        data[34] = 0xEC;
        let digest = compute_digest(&data).unwrap();
        data[35..].copy_from_slice(&digest);

        let verification = parse(&data).unwrap().verify();
        assert!(verification.is_consistent());
        assert_eq!(verification.findings().to_string(), "consistent");
    }
}
