//! Big-endian register word conversions

/// NaN marker SMA devices report for unavailable signed 32-bit values.
pub const SMA_NAN_S32: i32 = i32::MIN;

pub fn i16_from_words(words: &[u16]) -> Option<i16> {
    words.first().map(|w| *w as i16)
}

pub fn u32_from_words(words: &[u16]) -> Option<u32> {
    match words {
        [hi, lo, ..] => Some(u32::from(*hi) << 16 | u32::from(*lo)),
        _ => None,
    }
}

pub fn i32_from_words(words: &[u16]) -> Option<i32> {
    u32_from_words(words).map(|v| v as i32)
}

pub fn u64_from_words(words: &[u16]) -> Option<u64> {
    match words {
        [a, b, c, d, ..] => Some(
            u64::from(*a) << 48 | u64::from(*b) << 32 | u64::from(*c) << 16 | u64::from(*d),
        ),
        _ => None,
    }
}

pub fn u32_to_words(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

pub fn i32_to_words(value: i32) -> [u16; 2] {
    u32_to_words(value as u32)
}
