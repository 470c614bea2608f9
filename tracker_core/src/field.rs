/*!
24-bit field decoding.

Every pose and lens value in a frame is carried as three consecutive bytes,
most significant first. Values are kept unsigned: no sign extension is
applied anywhere in the pipeline, even for rotations near the wrap point.
*/

use crate::protocol::FRAME_LEN;

/// Largest value a 24-bit field can carry
pub const FIELD_MAX: u32 = 0x00FF_FFFF;

/// Reconstruct a big-endian unsigned 24-bit value from three bytes
#[inline]
pub fn decode24(b0: u8, b1: u8, b2: u8) -> u32 {
    (u32::from(b0) << 16) | (u32::from(b1) << 8) | u32::from(b2)
}

/// Decode the field starting at `offset` of a frame. Callers pass the
/// fixed offsets of `Field`, which all leave room for three bytes.
#[inline]
pub(crate) fn decode24_at(bytes: &[u8; FRAME_LEN], offset: usize) -> u32 {
    decode24(bytes[offset], bytes[offset + 1], bytes[offset + 2])
}

/// Inverse of [`decode24`], masking to 24 bits
pub fn encode24(value: u32) -> [u8; 3] {
    let value = value & FIELD_MAX;
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode24_matches_weighted_sum() {
        for &(b0, b1, b2) in &[(0u8, 0u8, 0u8), (0x00, 0x80, 0x00), (0x12, 0x34, 0x56), (0xFF, 0xFF, 0xFF)] {
            let expected = u32::from(b0) * 65536 + u32::from(b1) * 256 + u32::from(b2);
            assert_eq!(decode24(b0, b1, b2), expected);
        }
    }

    #[test]
    fn test_decode24_no_sign_extension() {
        assert_eq!(decode24(0xFF, 0xFF, 0xFF), FIELD_MAX);
        assert_eq!(decode24(0x80, 0x00, 0x00), 0x80_0000);
    }

    #[test]
    fn test_decode24_injective_over_high_byte_and_low_byte() {
        let mut seen = std::collections::HashSet::new();
        for b0 in 0..=255u8 {
            for b2 in 0..=255u8 {
                assert!(seen.insert(decode24(b0, 0x5A, b2)));
            }
        }
    }

    #[test]
    fn test_decode24_at_reads_last_field_of_frame() {
        let mut frame = [0u8; FRAME_LEN];
        frame[FRAME_LEN - 4..FRAME_LEN - 1].copy_from_slice(&[0x0A, 0x0B, 0x0C]);
        assert_eq!(decode24_at(&frame, FRAME_LEN - 4), 0x0A_0B0C);
        assert_eq!(decode24_at(&frame, 0), 0);
    }

    #[test]
    fn test_encode24_masks_high_bits() {
        assert_eq!(encode24(0x0100_0001), [0x00, 0x00, 0x01]);
        let [b0, b1, b2] = encode24(32768);
        assert_eq!(decode24(b0, b1, b2), 32768);
    }
}
