//! LEB128-64b9B varints and the zig-zag mapping used by the V2 counts payload.
//!
//! This is not quite Protobuf's LEB128: 64-bit values take at most 9 bytes rather than 10. The
//! first 8 bytes carry 7 bits each with a continuation high bit, and the 9th byte, if present,
//! carries the top 8 bits as-is.

use byteorder::ReadBytesExt;
use std::io::{self, Read};

/// Most bytes a single encoded number can take.
pub const MAX_VARINT_LEN: usize = 9;

/// Number of bytes `varint_write` will use for `input`, in [1, 9].
pub fn encoded_len(input: u64) -> usize {
    // each of the first 8 bytes holds 7 bits
    for n in 1..MAX_VARINT_LEN {
        if shift_by_7s(input, n as u8) == 0 {
            return n;
        }
    }
    MAX_VARINT_LEN
}

/// Write `input` to `buf`, which must have room for `encoded_len(input)` bytes. Returns the number
/// of bytes written.
#[inline]
pub fn varint_write(input: u64, buf: &mut [u8]) -> usize {
    // Unrolled: the 9th byte is awkward to express in a loop.
    if shift_by_7s(input, 1) == 0 {
        buf[0] = input as u8;
        return 1;
    }
    // set high bit because more bytes are coming, then next 7 bits of value.
    buf[0] = 0x80 | ((input & 0x7F) as u8);
    if shift_by_7s(input, 2) == 0 {
        // All zero above bottom 2 chunks, this is the last byte, so no high bit
        buf[1] = shift_by_7s(input, 1) as u8;
        return 2;
    }
    buf[1] = nth_7b_chunk_with_high_bit(input, 1);
    if shift_by_7s(input, 3) == 0 {
        buf[2] = shift_by_7s(input, 2) as u8;
        return 3;
    }
    buf[2] = nth_7b_chunk_with_high_bit(input, 2);
    if shift_by_7s(input, 4) == 0 {
        buf[3] = shift_by_7s(input, 3) as u8;
        return 4;
    }
    buf[3] = nth_7b_chunk_with_high_bit(input, 3);
    if shift_by_7s(input, 5) == 0 {
        buf[4] = shift_by_7s(input, 4) as u8;
        return 5;
    }
    buf[4] = nth_7b_chunk_with_high_bit(input, 4);
    if shift_by_7s(input, 6) == 0 {
        buf[5] = shift_by_7s(input, 5) as u8;
        return 6;
    }
    buf[5] = nth_7b_chunk_with_high_bit(input, 5);
    if shift_by_7s(input, 7) == 0 {
        buf[6] = shift_by_7s(input, 6) as u8;
        return 7;
    }
    buf[6] = nth_7b_chunk_with_high_bit(input, 6);
    if shift_by_7s(input, 8) == 0 {
        buf[7] = shift_by_7s(input, 7) as u8;
        return 8;
    }
    buf[7] = nth_7b_chunk_with_high_bit(input, 7);
    // last whole byte as is
    buf[8] = (input >> 56) as u8;
    9
}

/// Read from a slice that must be at least 9 bytes long. Returns the decoded number and how many
/// bytes were consumed.
#[inline]
pub fn varint_read_slice(slice: &[u8]) -> (u64, usize) {
    let mut value = 0_u64;
    for (i, &b) in slice.iter().take(MAX_VARINT_LEN - 1).enumerate() {
        value |= low_7_bits(b) << (7 * i);
        if !is_high_bit_set(b) {
            return (value, i + 1);
        }
    }
    // use last byte as is
    value |= u64::from(slice[MAX_VARINT_LEN - 1]) << (7 * 8);
    (value, MAX_VARINT_LEN)
}

/// Read one number from `reader`. Fails with `UnexpectedEof` if the input ends inside a varint.
pub fn varint_read<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut value = 0_u64;
    for i in 0..(MAX_VARINT_LEN - 1) {
        let b = reader.read_u8()?;
        value |= low_7_bits(b) << (7 * i);
        if !is_high_bit_set(b) {
            return Ok(value);
        }
    }
    let b = reader.read_u8()?;
    value |= u64::from(b) << (7 * 8);
    Ok(value)
}

/// Map signed numbers to unsigned: 0 to 0, -1 to 1, 1 to 2, -2 to 3, etc
#[inline]
pub fn zig_zag_encode(num: i64) -> u64 {
    // If num < 0, num >> 63 is all 1 and vice versa.
    ((num << 1) ^ (num >> 63)) as u64
}

/// Inverse of `zig_zag_encode`.
#[inline]
pub fn zig_zag_decode(encoded: u64) -> i64 {
    ((encoded >> 1) as i64) ^ -((encoded & 1) as i64)
}

/// input shifted over by `n` groups of 7 bits
#[inline]
fn shift_by_7s(input: u64, n: u8) -> u64 {
    input >> (7 * n)
}

/// The n'th chunk (starting from least significant) of 7 bits, with the high bit set.
#[inline]
fn nth_7b_chunk_with_high_bit(input: u64, n: u8) -> u8 {
    (shift_by_7s(input, n) as u8) | 0x80
}

#[inline]
fn low_7_bits(b: u8) -> u64 {
    u64::from(b & 0x7F)
}

#[inline]
fn is_high_bit_set(b: u8) -> bool {
    (b & 0x80) != 0
}
