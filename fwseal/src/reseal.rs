use crate::digest::{DIGEST_LEN, ImageDigest, compute_digest};
use crate::error::FormatError;
use crate::header::ImageHeader;
use crate::image::ParsedImage;
use std::fmt;

/// Recomputes the checksum and digest of a copy of `image`.
///
/// The caller's buffer is never modified. On error no bytes are returned.
///
/// # Errors
///
/// Returns the [`FormatError`] that stopped parsing.
///
/// # Example
///
/// ```
/// let mut image = vec![0xE9, 0x01];
/// image.resize(24, 0);
/// image.extend(0u32.to_le_bytes());
/// image.extend(2u32.to_le_bytes());
/// image.extend([0x01, 0x02]);
/// image.extend([0u8; 33]);
///
/// let sealed = fwseal::reseal(&image).unwrap();
/// assert_eq!(sealed[sealed.len() - 33], 0xEC);
/// assert_eq!(fwseal::reseal(&sealed).unwrap(), sealed);
/// ```
pub fn reseal(image: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut working = image.to_vec();
    let report = reseal_in_place(&mut working)?;
    log::debug!("resealed copy, changed: {}", report.changed());
    Ok(working)
}

/// Recomputes the checksum and digest directly in `image`.
///
/// The whole layout is validated before the first byte is written, so on
/// error `image` is unchanged.
///
/// # Errors
///
/// Returns the [`FormatError`] that stopped parsing.
pub fn reseal_in_place(image: &mut [u8]) -> Result<Resealed, FormatError> {
    let mut resealer = Resealer {
        image,
        stage: Stage::Loaded,
    };

    resealer.validate_header()?;
    let (old_checksum, new_checksum, checksum_offset) = resealer.recompute_checksum()?;
    let (old_digest, new_digest, trailer_start) = resealer.recompute_digest()?;
    resealer.advance(Stage::Resealed);

    Ok(Resealed {
        checksum_offset,
        trailer_start,
        old_checksum,
        new_checksum,
        old_digest,
        new_digest,
    })
}

impl<R: AsRef<[u8]> + AsMut<[u8]>> ParsedImage<R> {
    /// Recomputes the checksum and digest of this image in place.
    ///
    /// Use this after editing segment data through
    /// [`ParsedImage::segment_data_mut()`].
    pub fn reseal(&mut self) -> Result<Resealed, FormatError> {
        reseal_in_place(self.raw_mut())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Loaded,
    HeaderValidated,
    ChecksumRecomputed,
    DigestRecomputed,
    Resealed,
}

struct Resealer<'a> {
    image: &'a mut [u8],
    stage: Stage,
}

impl Resealer<'_> {
    fn advance(&mut self, next: Stage) {
        log::trace!("reseal: {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn reject(&self, err: FormatError) -> FormatError {
        log::trace!("reseal: {:?} -> Rejected ({err})", self.stage);
        err
    }

    fn validate_header(&mut self) -> Result<(), FormatError> {
        let header = ImageHeader::read(&*self.image).map_err(|e| self.reject(e))?;
        log::trace!("reseal: header declares {} segments", header.segment_count());
        self.advance(Stage::HeaderValidated);
        Ok(())
    }

    /// Walks the segments and writes the new checksum in front of the trailer.
    fn recompute_checksum(&mut self) -> Result<(u8, u8, usize), FormatError> {
        let (old, new, offset) = {
            let parsed = ParsedImage::new(&*self.image).map_err(|e| self.reject(e))?;
            (
                parsed.stored_checksum(),
                parsed.computed_checksum(),
                parsed.checksum_offset(),
            )
        };

        self.image[offset] = new;
        log::debug!("checksum at 0x{offset:X}: 0x{old:02X} -> 0x{new:02X}");

        self.advance(Stage::ChecksumRecomputed);
        Ok((old, new, offset))
    }

    /// Hashes the image including the checksum just written.
    fn recompute_digest(&mut self) -> Result<(ImageDigest, ImageDigest, usize), FormatError> {
        debug_assert_eq!(self.stage, Stage::ChecksumRecomputed);

        let new = compute_digest(&*self.image).map_err(|e| self.reject(e))?;
        let start = self.image.len() - DIGEST_LEN;

        let trailer = &mut self.image[start..];
        let mut old = [0u8; DIGEST_LEN];
        old.copy_from_slice(trailer);
        trailer.copy_from_slice(&new);

        self.advance(Stage::DigestRecomputed);
        Ok((old, new, start))
    }
}

/// What a reseal changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Resealed {
    pub checksum_offset: usize,
    pub trailer_start: usize,
    pub old_checksum: u8,
    pub new_checksum: u8,
    pub old_digest: ImageDigest,
    pub new_digest: ImageDigest,
}

impl Resealed {
    /// Returns `true` if either the checksum or the digest was rewritten with
    /// a different value.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.old_checksum != self.new_checksum || self.old_digest != self.new_digest
    }
}

impl fmt::Display for Resealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Checksum @ 0x{:X}: 0x{:02X} -> 0x{:02X}",
            self.checksum_offset, self.old_checksum, self.new_checksum
        )?;
        writeln!(f, "Digest @ 0x{:X}:", self.trailer_start)?;
        writeln!(f, "  old {}", hex::encode(self.old_digest))?;
        write!(f, "  new {}", hex::encode(self.new_digest))
    }
}
