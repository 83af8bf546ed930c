//! Unsigned LEB128, the variable-length integer used throughout the mapping format.

use crate::core::error::{CompileResult, CoverageError};

pub fn write_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decode one value at `*pos`, advancing `pos` past it.
pub fn read_uleb128(bytes: &[u8], pos: &mut usize) -> CompileResult<u64> {
    let start = *pos;
    let mut result = 0u64;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*pos) else {
            return Err(CoverageError::MalformedMapping {
                offset: start,
                reason: "truncated LEB128 value".to_string(),
            });
        };
        *pos += 1;

        if shift >= 64 || (shift == 63 && byte & 0x7e != 0) {
            return Err(CoverageError::MalformedMapping {
                offset: start,
                reason: "LEB128 value does not fit in 64 bits".to_string(),
            });
        }
        result |= u64::from(byte & 0x7f) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
}
