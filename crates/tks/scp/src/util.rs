//! Common byte utilities

use subtle::ConstantTimeEq;

use crate::{Error, Result};

/// Check that a buffer has exactly the expected length
pub fn check_length(field: &'static str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::InvalidLength {
            field,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Copy a buffer into a fixed-size array, validating its length
pub fn to_array<const N: usize>(field: &'static str, data: &[u8]) -> Result<[u8; N]> {
    check_length(field, data, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(data);
    Ok(out)
}

/// Parse a configured version byte as an unsigned value
///
/// Accepts `"80"`, `"0x80"` and `"#80"`; the result always covers the full
/// 0..=255 range.
pub fn parse_version_byte(value: &str) -> Option<u8> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .or_else(|| value.strip_prefix('#'))
        .unwrap_or(value);
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    // from_str_radix also takes a sign
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// Compare two byte strings in constant time
///
/// Buffers of different length compare unequal without inspecting content.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Set odd parity on every byte of a DES key
pub fn set_des_parity(key: &mut [u8]) {
    for byte in key.iter_mut() {
        let high = *byte & 0xFE;
        *byte = if high.count_ones() % 2 == 0 {
            high | 0x01
        } else {
            high
        };
    }
}
