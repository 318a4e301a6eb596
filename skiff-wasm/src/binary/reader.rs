//! Vector and name reading helpers shared by the section decoders.

use super::{cursor::Cursor, leb128, BinaryReadError, Result};

/// Read a length-prefixed byte vector (u32 length via ULEB128).
pub fn read_byte_vec(cur: &mut Cursor) -> Result<Vec<u8>> {
    let len = leb128::read_uleb_u32(cur)? as usize;
    Ok(cur.read_bytes(len)?.to_vec())
}

/// Read a UTF-8 name (length-prefixed bytes).
pub fn read_name(cur: &mut Cursor) -> Result<String> {
    let bytes = read_byte_vec(cur)?;
    String::from_utf8(bytes).map_err(|_| BinaryReadError::InvalidUtf8 {
        offset: cur.offset(),
    })
}

/// Read a vector of T using the provided element reader.
pub fn read_vec<T, F>(cur: &mut Cursor, mut elem: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor) -> Result<T>,
{
    let len = leb128::read_uleb_u32(cur)? as usize;
    let mut out = Vec::with_capacity(len.min(1 << 16));
    for _ in 0..len {
        out.push(elem(cur)?);
    }
    Ok(out)
}
