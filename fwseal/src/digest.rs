use crate::error::{FormatError, TooShortSnafu};
use sha2::digest::consts::U32;
use sha2::digest::{Digest, OutputSizeUser};
use sha2::Sha256;

/// Size of the digest trailer at the end of the image.
pub const DIGEST_LEN: usize = 32;

/// A 256-bit digest as stored in the image trailer.
pub type ImageDigest = [u8; DIGEST_LEN];

/// Returns the offset of the digest trailer in an image of `len` bytes.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] if the image cannot hold a trailer.
pub fn trailer_start(len: usize) -> Result<usize, FormatError> {
    len.checked_sub(DIGEST_LEN).ok_or_else(|| {
        TooShortSnafu {
            len,
            min: DIGEST_LEN,
        }
        .build()
    })
}

/// Computes the SHA-256 digest of everything in front of the trailer,
/// including the checksum byte.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] if `image` is shorter than the trailer.
pub fn compute_digest(image: &[u8]) -> Result<ImageDigest, FormatError> {
    compute_digest_with::<Sha256>(image)
}

/// Same as [`compute_digest()`] using an arbitrary hash with a 32-byte output.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] if `image` is shorter than the trailer.
pub fn compute_digest_with<D>(image: &[u8]) -> Result<ImageDigest, FormatError>
where
    D: Digest + OutputSizeUser<OutputSize = U32>,
{
    let end = trailer_start(image.len())?;
    let digest = D::digest(&image[..end]);

    log::debug!("digest over [0x0, 0x{end:X}): {}", hex::encode(&digest));

    Ok(digest.into())
}
