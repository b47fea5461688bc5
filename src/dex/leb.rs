//! ULEB128 / ULEB128p1 / SLEB128 codecs used throughout the data section.

use log::warn;

use crate::dex::error::DexError;

pub fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;

    if remaining == 0 {
        result.push(0);
        return result;
    }

    while remaining != 0 {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        if remaining != 0 {
            byte |= 0x80;
        }

        result.push(byte);
    }

    result
}

/// Checked variant for values coming from wider or signed arithmetic, e.g. a
/// recomputed offset. Negative or oversized values are rejected.
pub fn try_encode_uleb128(value: i64) -> Result<Vec<u8>, DexError> {
    if value < 0 {
        return Err(DexError::invalid_argument(&format!("uleb128 cannot encode negative value {}", value)));
    }
    if value > u32::MAX as i64 {
        return Err(DexError::invalid_argument(&format!("uleb128 value {} does not fit in 32 bits", value)));
    }
    Ok(encode_uleb128(value as u32))
}

pub fn decode_uleb128(encoded: &[u8]) -> (u32, usize) {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;
    let mut count: usize = 0;

    for &byte in encoded {
        count += 1;

        let low = (byte & 0x7F) as u32;
        if shift < 32 {
            // guard against UB: saturate the shift and use wrapping to avoid panic
            value = value.wrapping_add(low.wrapping_shl(shift));
        }

        let cont = (byte & 0x80) != 0;
        shift = shift.saturating_add(7);

        // DEX uleb128 values are 32-bit, valid encodings are at most 5 bytes.
        if count == 5 {
            if byte & 0xF0 != 0 {
                warn!("[leb] malformed uleb128, 5th byte 0x{:02x} has bits above 32", byte);
            }
            break;
        }
        if !cont {
            break;
        }
    }

    (value, count)
}

pub fn encode_sleb128(value: i32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        let is_more =
            !((remaining == 0 && (byte & 0x40) == 0) || (remaining == -1 && (byte & 0x40) != 0));
        if is_more {
            byte |= 0x80;
        }

        result.push(byte);

        if !is_more {
            break;
        }
    }

    result
}

pub fn decode_sleb128(encoded: &[u8]) -> (i32, usize) {
    let mut value: i32 = 0;
    let mut shift: u32 = 0;
    let mut count: usize = 0;
    let mut last_byte: u8 = 0;

    for &byte in encoded {
        count += 1;
        last_byte = byte;

        let low = (byte & 0x7F) as i32;
        if shift < 32 {
            value |= low.wrapping_shl(shift);
        }

        let cont = (byte & 0x80) != 0;
        shift = shift.saturating_add(7);

        // i32 sleb128 likewise fits within 5 bytes
        if !cont || count == 5 {
            break;
        }
    }

    // Sign-extend if needed and we didn't fill all 32 bits
    if (last_byte & 0x40) != 0 && shift < 32 {
        value |= (-1i32).wrapping_shl(shift);
    }

    (value, count)
}

pub fn encode_uleb128p1(value: i32) -> Vec<u8> {
    encode_uleb128(value.wrapping_add(1) as u32)
}

pub fn decode_uleb128p1(encoded: &[u8]) -> (i32, usize) {
    let (v, c) = decode_uleb128(encoded);
    ((v as i32).wrapping_sub(1), c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], 127),
            (vec![0x80, 0x01], 128),
            (vec![0x80, 0x7F], 16256),
            (vec![0xE5, 0x8E, 0x26], 624485),
        ];

        for (encoded, expected) in cases {
            let (v, _) = decode_uleb128(&encoded);
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn test_encode_sleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (-1, vec![0x7F]),
            (-123456, vec![0xC0, 0xBB, 0x78]),
            (-128, vec![0x80, 0x7F]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_sleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_sleb128() {
        let cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], -1),
            (vec![0xFF, 0x00], 127),
            (vec![0x80, 0x7F], -128),
            (vec![0xC0, 0xBB, 0x78], -123456),
        ];

        for (encoded, expected) in cases {
            let (v, _) = decode_sleb128(&encoded);
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn test_uleb128p1_no_index() {
        assert_eq!(encode_uleb128p1(-1), vec![0x00]);
        assert_eq!(decode_uleb128p1(&[0x00]), (-1, 1));
        assert_eq!(decode_uleb128p1(&[0x80, 0x01]), (127, 2));
    }

    #[test]
    fn test_uleb128_extremes() {
        let enc = encode_uleb128(u32::MAX);
        assert_eq!(enc, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(decode_uleb128(&enc), (u32::MAX, 5));

        let (v, n) = decode_sleb128(&encode_sleb128(i32::MIN));
        assert_eq!((v, n), (i32::MIN, 5));
        let (v, _) = decode_sleb128(&encode_sleb128(i32::MAX));
        assert_eq!(v, i32::MAX);
    }

    #[test]
    fn test_uleb128_fifth_byte_overflow_is_not_fatal() {
        // high nibble of the 5th byte set: warned about, decoding keeps the low bits
        let (v, n) = decode_uleb128(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0x01]);
        assert_eq!(n, 5);
        assert_eq!(v, u32::MAX);
    }

    fn sweep_values() -> Vec<u32> {
        let mut values: Vec<u32> = (0..32u32)
            .flat_map(|bit| {
                let p = 1u32 << bit;
                [p.wrapping_sub(1), p, p.wrapping_add(1)]
            })
            .collect();
        values.extend((0..=u32::MAX).step_by(0x1_0001));
        values.push(u32::MAX);
        values
    }

    #[test]
    fn test_uleb128_sweep() {
        for v in sweep_values() {
            let enc = encode_uleb128(v);
            let bits = 32 - v.leading_zeros() as usize;
            assert_eq!(enc.len(), bits.max(1).div_ceil(7), "length of {:#x}", v);
            assert_eq!(decode_uleb128(&enc), (v, enc.len()), "value {:#x}", v);
        }
    }

    #[test]
    fn test_sleb128_sweep() {
        for v in sweep_values() {
            for s in [v as i32, (v as i32).wrapping_neg()] {
                let enc = encode_sleb128(s);
                assert_eq!(decode_sleb128(&enc), (s, enc.len()), "value {}", s);
            }
        }
    }

    #[test]
    fn test_uleb128p1_sweep() {
        for v in sweep_values() {
            let s = (v as i32).wrapping_sub(1);
            let enc = encode_uleb128p1(s);
            assert_eq!(decode_uleb128p1(&enc), (s, enc.len()), "value {}", s);
        }
    }

    #[test]
    fn test_try_encode_uleb128_rejects_negative() {
        let e = try_encode_uleb128(-5).unwrap_err();
        assert_eq!(e.kind(), crate::dex::error::ErrorKind::InvalidArgument);
        assert_eq!(try_encode_uleb128(300).unwrap(), vec![0xAC, 0x02]);
    }
}
