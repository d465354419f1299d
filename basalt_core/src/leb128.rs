//! LEB128 variable-length integer codec.
//!
//! The LSDA stores most of its scalar fields as LEB128 values: a series
//! of bytes each carrying seven value bits, with the high bit flagging
//! continuation. Signed values sign-extend from the final byte's bit 6.
//!
//! Readers advance a raw byte cursor because the encoded tables carry no
//! length of their own; writers append to a byte buffer and exist for the
//! compiler-side table emitter and the test suites.

/// Reads an unsigned LEB128 value, advancing the cursor past it.
///
/// # Safety
///
/// `cursor` must point at a well-formed encoded value within readable
/// memory; the read stops at the first byte with the continuation bit
/// clear.
#[must_use]
pub unsafe fn read_uleb128(cursor: &mut *const u8) -> u64 {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = unsafe { cursor.read() };
        *cursor = unsafe { cursor.add(1) };
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return value;
        }
        shift += 7;
    }
}

/// Reads a signed LEB128 value, advancing the cursor past it.
///
/// # Safety
///
/// Same contract as [`read_uleb128`].
#[must_use]
pub unsafe fn read_sleb128(cursor: &mut *const u8) -> i64 {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    let mut byte;
    loop {
        byte = unsafe { cursor.read() };
        *cursor = unsafe { cursor.add(1) };
        value |= u64::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    // Sign-extend from bit 6 of the final byte.
    if byte & 0x40 != 0 && shift < 64 {
        value |= u64::MAX << shift;
    }
    value as i64
}

/// Appends an unsigned LEB128 encoding of `value` to `buf`.
pub fn write_uleb128(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            return;
        }
    }
}

/// Appends a signed LEB128 encoding of `value` to `buf`.
pub fn write_sleb128(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Returns the encoded byte length of `value` as unsigned LEB128.
#[must_use]
pub fn uleb128_len(mut value: u64) -> usize {
    let mut len = 1;
    value >>= 7;
    while value != 0 {
        len += 1;
        value >>= 7;
    }
    len
}
