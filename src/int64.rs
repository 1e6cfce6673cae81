//! Fixed-width sign-magnitude encoding for the 64-bit fields of the patch format.
//!
//! The magnitude is stored little-endian in all 8 bytes and the top bit of the
//! last byte carries the sign. Magnitudes must fit in 63 bits: `i64::MIN` has
//! no representation and encodes the same as zero.

use crate::error::Corruption;

pub const SIZE: usize = 8;

const SIGN: u64 = 1 << 63;

pub fn encode(value: i64) -> [u8; SIZE] {
    let mut magnitude = value.unsigned_abs();
    if value < 0 {
        magnitude |= SIGN;
    }
    magnitude.to_le_bytes()
}

pub fn decode(bytes: &[u8]) -> Result<i64, Corruption> {
    let raw: [u8; SIZE] = bytes
        .get(..SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(Corruption::TruncatedInt(bytes.len()))?;
    let raw = u64::from_le_bytes(raw);

    // clearing the sign bit leaves at most 63 bits, always fits
    let magnitude = (raw & !SIGN) as i64;
    if raw & SIGN != 0 {
        Ok(-magnitude)
    } else {
        Ok(magnitude)
    }
}

/// Decode the `index`-th 8-byte field of `bytes`.
#[inline]
pub(crate) fn decode_at(bytes: &[u8], index: usize) -> Result<i64, Corruption> {
    decode(bytes.get(index * SIZE..).unwrap_or(&[]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_layouts() {
        assert_eq!(encode(0), [0; 8]);
        assert_eq!(encode(1), [1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encode(-1), [1, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(encode(0x0102), [2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encode(i64::MAX), [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
    }

    #[test]
    fn extremes() {
        assert_eq!(decode(&encode(i64::MAX)).unwrap(), i64::MAX);
        assert_eq!(decode(&encode(-i64::MAX)).unwrap(), -i64::MAX);
        // accepted limitation: the magnitude of i64::MIN needs bit 63
        assert_eq!(decode(&encode(i64::MIN)).unwrap(), 0);
    }

    #[test]
    fn negative_zero_decodes_as_zero() {
        assert_eq!(decode(&[0, 0, 0, 0, 0, 0, 0, 0x80]).unwrap(), 0);
    }

    #[test]
    fn truncated() {
        for len in 0..SIZE {
            let bytes = vec![0u8; len];
            assert!(matches!(decode(&bytes), Err(Corruption::TruncatedInt(l)) if l == len));
        }
    }

    #[test]
    fn reads_only_the_first_field() {
        let mut bytes = encode(-42).to_vec();
        bytes.extend_from_slice(&encode(7));
        assert_eq!(decode(&bytes).unwrap(), -42);
        assert_eq!(decode_at(&bytes, 1).unwrap(), 7);
        assert!(decode_at(&bytes, 2).is_err());
    }

    proptest! {
        #[test]
        fn cycle(v in -(1i64 << 62)..(1i64 << 62)) {
            prop_assert_eq!(decode(&encode(v)).unwrap(), v);
        }
    }
}
