//! Signed numbers as zig-zag varints in a [`ByteBuffer`].
//!
//! The bit layout is the LEB128-64b9B form from the `varint` functions, so at most 9 bytes per
//! number. It is not interchangeable with Protobuf varints.

use super::byte_buffer::ByteBuffer;
use super::varint::{varint_read, varint_write, zig_zag_decode, zig_zag_encode, MAX_VARINT_LEN};
use std::io;

/// Append `value` to `buffer`. Returns the number of bytes written.
pub fn encode(buffer: &mut ByteBuffer, value: i64) -> usize {
    let mut bytes = [0_u8; MAX_VARINT_LEN];
    let len = varint_write(zig_zag_encode(value), &mut bytes);
    buffer.put_slice(&bytes[..len]);
    len
}

/// Read one number at the buffer's cursor.
///
/// Fails with `UnexpectedEof` if the buffer ends inside the number; the cursor is then at the end.
pub fn decode(buffer: &mut ByteBuffer) -> io::Result<i64> {
    varint_read(buffer).map(zig_zag_decode)
}
