use crate::digest::DIGEST_LEN;
use crate::error::{FormatError, TooShortSnafu};
use crate::image::ParsedImage;
use std::fmt;

/// How far from the end of the image to look for the expected checksum.
pub const TAIL_WINDOW: usize = 40;

const MIN_LEN: usize = 1 + DIGEST_LEN;

/// Compares a known-good image with an edited one and explains where the
/// checksum of the edited image should be and what it should hold.
///
/// Only `modified` has to parse; `original` is only read at its own checksum
/// slot.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] if either image cannot hold a checksum
/// and trailer, or the parse error of `modified`.
pub fn diagnose(original: &[u8], modified: &[u8]) -> Result<Diagnosis, FormatError> {
    for image in [original, modified] {
        snafu::ensure!(
            image.len() >= MIN_LEN,
            TooShortSnafu {
                len: image.len(),
                min: MIN_LEN,
            }
        );
    }

    let parsed = ParsedImage::new(modified)?;

    let segments: Vec<_> = parsed
        .segments()
        .map(|s| SegmentSummary {
            index: s.index(),
            load_address: s.load_address(),
            data_len: s.len(),
        })
        .collect();

    let expected_checksum = parsed.computed_checksum();
    let window_start = modified.len().saturating_sub(TAIL_WINDOW);
    let tail_matches = modified[window_start..]
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == expected_checksum)
        .map(|(i, _)| {
            let offset = window_start + i;
            TailMatch {
                offset,
                from_end: modified.len() - offset,
            }
        })
        .collect();

    Ok(Diagnosis {
        original: Slot::of(original),
        modified: Slot::of(modified),
        expected_checksum,
        total_data_bytes: segments.iter().map(|s| s.data_len).sum(),
        segments,
        tail_matches,
    })
}

/// Location and content of the checksum byte of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub len: usize,
    pub trailer_start: usize,
    pub checksum_offset: usize,
    pub checksum: u8,
}

impl Slot {
    fn of(image: &[u8]) -> Self {
        let trailer_start = image.len() - DIGEST_LEN;
        Self {
            len: image.len(),
            trailer_start,
            checksum_offset: trailer_start - 1,
            checksum: image[trailer_start - 1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSummary {
    pub index: usize,
    pub load_address: u32,
    pub data_len: usize,
}

/// A byte near the end of the image equal to the expected checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailMatch {
    pub offset: usize,
    pub from_end: usize,
}

/// Result of [`diagnose()`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Diagnosis {
    pub original: Slot,
    pub modified: Slot,
    pub expected_checksum: u8,
    pub segments: Vec<SegmentSummary>,
    pub total_data_bytes: usize,
    pub tail_matches: Vec<TailMatch>,
}

impl Diagnosis {
    /// Returns `true` if the edited image already stores the expected checksum.
    #[must_use]
    pub fn checksum_slot_ok(&self) -> bool {
        self.modified.checksum == self.expected_checksum
    }

    /// Returns `true` if both images are the same size, so their checksum
    /// slots are at the same offset.
    #[must_use]
    pub fn same_layout(&self) -> bool {
        self.original.len == self.modified.len
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Original size: {}", self.original.len)?;
        writeln!(f, "Modified size: {}", self.modified.len)?;
        writeln!(f)?;

        for (name, slot) in [("Original", &self.original), ("Modified", &self.modified)] {
            writeln!(
                f,
                "{name}: image data 0x0..0x{:X}, checksum at 0x{:X} = 0x{:02X}",
                slot.trailer_start, slot.checksum_offset, slot.checksum
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Segments: {}", self.segments.len())?;
        for s in &self.segments {
            writeln!(
                f,
                "  #{}: load_addr=0x{:08X}, data_len={}",
                s.index, s.load_address, s.data_len
            )?;
        }
        writeln!(f, "Total data bytes: {}", self.total_data_bytes)?;
        writeln!(
            f,
            "Expected checksum: 0x{:02X} ({})",
            self.expected_checksum,
            if self.checksum_slot_ok() {
                "matches slot"
            } else {
                "slot differs"
            }
        )?;
        writeln!(f)?;

        write!(
            f,
            "Occurrences of 0x{:02X} in the last {TAIL_WINDOW} bytes:",
            self.expected_checksum
        )?;
        if self.tail_matches.is_empty() {
            write!(f, " none")?;
        }
        for m in &self.tail_matches {
            write!(f, "\n  0x{:X} (byte -{} from end)", m.offset, m.from_end)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reseal::reseal;

    fn sealed() -> Vec<u8> {
        let mut data = vec![0xE9, 0x01];
        data.resize(24, 0);
        data.extend(0x4200_0020u32.to_le_bytes());
        data.extend(4u32.to_le_bytes());
        data.extend([0x11, 0x22, 0x33, 0x44]);
        data.extend([0u8; 33]);
        reseal(&data).unwrap()
    }

    #[test]
    fn sealed_image_matches_itself() {
        let image = sealed();
        let diagnosis = diagnose(&image, &image).unwrap();

        assert!(diagnosis.checksum_slot_ok());
        assert!(diagnosis.same_layout());
        assert_eq!(diagnosis.total_data_bytes, 4);
        assert_eq!(diagnosis.expected_checksum, 0xEF ^ 0x11 ^ 0x22 ^ 0x33 ^ 0x44);
        assert_eq!(diagnosis.modified.checksum_offset, image.len() - 33);
        assert!(diagnosis.tail_matches.contains(&TailMatch {
            offset: image.len() - 33,
            from_end: 33,
        }));
    }

    #[test]
    fn edited_image_has_stale_slot() {
        let original = sealed();
        let mut modified = original.clone();
        modified[32] = 0x00;

        let diagnosis = diagnose(&original, &modified).unwrap();
        assert!(!diagnosis.checksum_slot_ok());
        assert_eq!(diagnosis.original.checksum, diagnosis.modified.checksum);
        assert_eq!(diagnosis.expected_checksum, 0xEF ^ 0x22 ^ 0x33 ^ 0x44);
        assert!(diagnosis.to_string().contains("slot differs"));
    }

    #[test]
    fn rejects_short_images() {
        let image = sealed();
        let err = diagnose(&image[..32], &image).unwrap_err();
        assert_eq!(err, FormatError::TooShort { len: 32, min: 33 });
    }

    #[test]
    fn reports_modified_parse_error() {
        let image = sealed();
        let mut broken = image.clone();
        broken[0] = 0x00;

        let err = diagnose(&image, &broken).unwrap_err();
        assert_eq!(err, FormatError::BadMagic { found: 0x00 });
    }
}
