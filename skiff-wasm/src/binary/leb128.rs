//! ULEB128/SLEB128 decoding for the integer widths the binary format uses.
//!
//! The 33-bit signed variant exists solely for block type immediates, which
//! overload a valtype byte and a positive type index in one signed space.

use super::{cursor::Cursor, BinaryReadError, Result};

/// Decode an unsigned LEB128 as u32 (max 5 bytes).
pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_uleb_generic(cur, 32).map(|v| v as u32)
}

/// Decode an unsigned LEB128 as u64 (max 10 bytes).
pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_uleb_generic(cur, 64)
}

/// Decode a signed LEB128 as i32 (max 5 bytes).
pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_sleb_generic(cur, 32).map(|v| v as i32)
}

/// Decode a signed LEB128 as i33 (max 5 bytes; block type immediates).
pub fn read_sleb_i33(cur: &mut Cursor) -> Result<i64> {
    read_sleb_generic(cur, 33)
}

/// Decode a signed LEB128 as i64 (max 10 bytes).
pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_sleb_generic(cur, 64)
}

fn read_uleb_generic(cur: &mut Cursor, bits: u8) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let max_bytes = (bits + 6) / 7;

    for _ in 0..max_bytes {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as u64;
        if shift >= 64 || (low << shift) >> shift != low {
            return Err(BinaryReadError::Leb128Overflow {
                target_bits: bits,
                offset: cur.offset(),
            });
        }
        result |= low << shift;

        if (byte & 0x80) == 0 {
            // Final byte: bits beyond the target width must be zero.
            if bits < 64 && (result >> bits) != 0 {
                return Err(BinaryReadError::Leb128Overflow {
                    target_bits: bits,
                    offset: cur.offset(),
                });
            }
            return Ok(result);
        }
        shift += 7;
    }

    Err(BinaryReadError::Leb128TooLong {
        limit: max_bytes,
        offset: cur.offset(),
    })
}

fn read_sleb_generic(cur: &mut Cursor, bits: u8) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let max_bytes = (bits + 6) / 7;

    for i in 0..max_bytes {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as i64;
        result |= low << shift;
        shift += 7;

        if (byte & 0x80) == 0 {
            // Sign extend if the sign bit of the final byte is set and the
            // full width has not been filled yet.
            if (byte & 0x40) != 0 && shift < bits as u32 {
                result |= (!0i64) << shift;
            }
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if result < min || result > max {
                    return Err(BinaryReadError::Leb128Overflow {
                        target_bits: bits,
                        offset: cur.offset(),
                    });
                }
            }
            return Ok(result);
        }

        if i + 1 == max_bytes {
            return Err(BinaryReadError::Leb128TooLong {
                limit: max_bytes,
                offset: cur.offset(),
            });
        }
    }

    Err(BinaryReadError::Leb128TooLong {
        limit: max_bytes,
        offset: cur.offset(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::cursor::Cursor;

    #[test]
    fn uleb32_basic() {
        let mut c = Cursor::new(&[0xE5, 0x8E, 0x26]); // 624485
        assert_eq!(read_uleb_u32(&mut c).unwrap(), 624485);
    }

    #[test]
    fn sleb32_basic() {
        // -624485 encoded as SLEB128: 9b f1 59
        let mut c = Cursor::new(&[0x9B, 0xF1, 0x59]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), -624485);
    }

    #[test]
    fn sleb33_positive_type_index() {
        // Type index 3 in a block type immediate: a single positive byte.
        let mut c = Cursor::new(&[0x03]);
        assert_eq!(read_sleb_i33(&mut c).unwrap(), 3);
    }

    #[test]
    fn sleb33_valtype_byte_is_negative() {
        // 0x40 (empty block type) decodes to -64 in the s33 space.
        let mut c = Cursor::new(&[0x40]);
        assert_eq!(read_sleb_i33(&mut c).unwrap(), -64);
    }

    #[test]
    fn uleb32_overflow() {
        let bytes = [0xFFu8; 6];
        let mut c = Cursor::new(&bytes);
        let err = read_uleb_u32(&mut c).unwrap_err();
        match err {
            BinaryReadError::Leb128TooLong { .. } | BinaryReadError::Leb128Overflow { .. } => {}
            e => panic!("unexpected error: {e:?}"),
        }
    }
}
