use crate::segment::Segment;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

/// Initial value of the image checksum.
pub const CHECKSUM_SEED: u8 = 0xEF;

/// Folds `data` into a running checksum.
#[must_use]
pub fn update_checksum(data: &[u8], checksum: u8) -> u8 {
    data.iter().fold(checksum, |acc, byte| acc ^ byte)
}

/// Computes the checksum over the payload of every segment.
///
/// Segment descriptors are not part of the checksum.
#[must_use]
pub fn compute_checksum(segments: &[Segment<'_>]) -> u8 {
    segments
        .iter()
        .fold(CHECKSUM_SEED, |checksum, segment| {
            update_checksum(segment.data(), checksum)
        })
}

/// Same as [`compute_checksum()`] but folds segments in parallel with rayon.
///
/// Each segment is reduced on its own and the partial results are combined
/// with XOR, so the result does not depend on scheduling.
#[must_use]
pub fn compute_checksum_parallel(segments: &[Segment<'_>]) -> u8 {
    let folded = segments
        .par_iter()
        .map(|segment| update_checksum(segment.data(), 0))
        .reduce(|| 0, |a, b| a ^ b);

    CHECKSUM_SEED ^ folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segments;

    fn segments_of(image: &[u8], count: usize) -> Vec<Segment<'_>> {
        Segments::new(image, count)
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn image(payloads: &[&[u8]]) -> Vec<u8> {
        let mut data = vec![0xE9, payloads.len() as u8];
        data.resize(24, 0);
        for payload in payloads {
            data.extend(0x4008_0000u32.to_le_bytes());
            data.extend((payload.len() as u32).to_le_bytes());
            data.extend(*payload);
        }
        data
    }

    #[test]
    fn seed_without_segments() {
        assert_eq!(compute_checksum(&[]), 0xEF);
        assert_eq!(compute_checksum_parallel(&[]), 0xEF);
    }

    #[test]
    fn folds_payload_only() {
        let data = image(&[&[0x01, 0x02]]);
        let segments = segments_of(&data, 1);
        assert_eq!(compute_checksum(&segments), 0xEC);

        let data = image(&[&[0x01, 0x02], &[0xFF]]);
        let segments = segments_of(&data, 2);
        assert_eq!(compute_checksum(&segments), 0x13);
    }

    #[test]
    fn parallel_matches_sequential() {
        let payloads: Vec<Vec<u8>> = (0..32u8)
            .map(|i| (0..(i as usize * 37)).map(|j| (j as u8).wrapping_mul(i)).collect())
            .collect();
        let refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
        let data = image(&refs);
        let segments = segments_of(&data, refs.len());

        assert_eq!(
            compute_checksum_parallel(&segments),
            compute_checksum(&segments)
        );
    }

    #[test]
    fn update_is_xor_fold() {
        assert_eq!(update_checksum(&[], 0x5A), 0x5A);
        assert_eq!(update_checksum(&[0x5A], 0x5A), 0);
        assert_eq!(update_checksum(&[0x0F, 0xF0], 0), 0xFF);
    }
}
