//! A growable byte buffer with a read cursor.
//!
//! Writes always append at the end; reads start at the cursor and advance it. Multi-byte numbers
//! are big-endian, as the V2 header requires.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read, Write};

/// Capacity of the first allocation.
const INITIAL_CAPACITY: usize = 64;

/// Bytes written so far, plus the position of the next read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    index: usize,
}

impl ByteBuffer {
    /// An empty buffer that allocates on first write.
    pub fn new() -> ByteBuffer {
        ByteBuffer::default()
    }

    /// An empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> ByteBuffer {
        ByteBuffer {
            data: Vec::with_capacity(capacity),
            index: 0,
        }
    }

    /// A buffer holding `data`, with the cursor at the start.
    pub fn from_vec(data: Vec<u8>) -> ByteBuffer {
        ByteBuffer { data, index: 0 }
    }

    /// Append one byte.
    pub fn put(&mut self, byte: u8) {
        self.grow_for(1);
        self.data.push(byte);
    }

    /// Append all of `bytes`.
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.grow_for(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Append a 32-bit number.
    pub fn put_u32(&mut self, value: u32) {
        let mut bytes = [0_u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.put_slice(&bytes);
    }

    /// Append a 64-bit number as two 32-bit halves, high half first.
    pub fn put_u64(&mut self, value: u64) {
        self.put_u32((value >> 32) as u32);
        self.put_u32(value as u32);
    }

    /// Append the IEEE-754 bits of `value`.
    pub fn put_f64(&mut self, value: f64) {
        self.put_u64(value.to_bits());
    }

    /// Overwrite 4 already written bytes at `offset`. Used to fill in length fields once the
    /// length is known.
    ///
    /// # Panics
    ///
    /// If fewer than 4 bytes were written past `offset`.
    pub fn set_u32_at(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.data[offset..offset + 4], value);
    }

    /// Read one byte.
    pub fn get(&mut self) -> io::Result<u8> {
        let byte = *self.data.get(self.index).ok_or_else(eof)?;
        self.index += 1;
        Ok(byte)
    }

    /// Read a 32-bit number.
    pub fn get_u32(&mut self) -> io::Result<u32> {
        let bytes = self.take(4)?;
        Ok(BigEndian::read_u32(bytes))
    }

    /// Read a 64-bit number written by `put_u64`.
    pub fn get_u64(&mut self) -> io::Result<u64> {
        if self.remaining() < 8 {
            return Err(eof());
        }
        let high = u64::from(self.get_u32()?);
        let low = u64::from(self.get_u32()?);
        Ok((high << 32) | low)
    }

    /// Read a number written by `put_f64`.
    pub fn get_f64(&mut self) -> io::Result<f64> {
        self.get_u64().map(f64::from_bits)
    }

    /// Move the cursor back to the start. The contents stay.
    pub fn reset_index(&mut self) {
        self.index = 0;
    }

    /// Move the cursor to `index`, clamped to the written length.
    pub fn set_index(&mut self, index: usize) {
        self.index = index.min(self.data.len());
    }

    /// Position of the next read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes between the cursor and the end.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.index
    }

    /// Bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop the contents and rewind, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.index = 0;
    }

    /// Everything written, regardless of the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The written bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Replace the contents with exactly `len` bytes from `reader` and rewind.
    pub(crate) fn fill_from<R: Read>(&mut self, reader: &mut R, len: usize) -> io::Result<()> {
        self.clear();
        // grow with the bytes actually read, not with an untrusted length
        let read = reader.take(len as u64).read_to_end(&mut self.data)?;
        if read != len {
            return Err(eof());
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.remaining() < n {
            return Err(eof());
        }
        let start = self.index;
        self.index += n;
        Ok(&self.data[start..self.index])
    }

    fn grow_for(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return;
        }
        let mut capacity = self.data.capacity().max(INITIAL_CAPACITY);
        while capacity < needed {
            capacity *= 2;
        }
        self.data.reserve_exact(capacity - self.data.len());
    }
}

impl Write for ByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for ByteBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.index..self.index + n]);
        self.index += n;
        Ok(n)
    }
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "read past the end of the buffer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_big_endian() {
        let mut buf = ByteBuffer::new();
        buf.put_u32(0x1c84_9313);
        buf.put_u64(0x0102_0304_0506_0708);

        assert_eq!(
            &[0x1c, 0x84, 0x93, 0x13, 1, 2, 3, 4, 5, 6, 7, 8],
            buf.as_slice()
        );
    }

    #[test]
    fn reads_follow_writes() {
        let mut buf = ByteBuffer::new();
        buf.put(7);
        buf.put_u32(u32::max_value());
        buf.put_u64((1 << 53) + 1);
        buf.put_f64(1.0);

        assert_eq!(7, buf.get().unwrap());
        assert_eq!(u32::max_value(), buf.get_u32().unwrap());
        assert_eq!((1 << 53) + 1, buf.get_u64().unwrap());
        assert_eq!(1.0, buf.get_f64().unwrap());
        assert_eq!(0, buf.remaining());
    }

    #[test]
    fn reset_index_rereads() {
        let mut buf = ByteBuffer::new();
        buf.put_u64(u64::max_value() - 1);
        assert_eq!(u64::max_value() - 1, buf.get_u64().unwrap());

        buf.reset_index();
        assert_eq!(8, buf.remaining());
        assert_eq!(u64::max_value() - 1, buf.get_u64().unwrap());
    }

    #[test]
    fn reading_past_end_is_eof() {
        let mut buf = ByteBuffer::from_vec(vec![1, 2, 3]);
        assert_eq!(
            io::ErrorKind::UnexpectedEof,
            buf.get_u32().unwrap_err().kind()
        );
        // a failed read does not move the cursor
        assert_eq!(0, buf.index());

        buf.set_index(3);
        assert_eq!(io::ErrorKind::UnexpectedEof, buf.get().unwrap_err().kind());
    }

    #[test]
    fn capacity_doubles() {
        let mut buf = ByteBuffer::new();
        buf.put(0);
        assert_eq!(INITIAL_CAPACITY, buf.data.capacity());

        buf.put_slice(&[0; INITIAL_CAPACITY]);
        assert_eq!(2 * INITIAL_CAPACITY, buf.data.capacity());
        assert_eq!(INITIAL_CAPACITY + 1, buf.len());
    }

    #[test]
    fn length_placeholder_is_patched() {
        let mut buf = ByteBuffer::new();
        buf.put_u32(0xAAAA_AAAA);
        buf.put_u32(0);
        buf.put_slice(&[9; 5]);
        buf.set_u32_at(4, 5);

        buf.set_index(4);
        assert_eq!(5, buf.get_u32().unwrap());
    }

    #[test]
    fn fill_from_reads_exactly_len() {
        let mut buf = ByteBuffer::from_vec(vec![9; 3]);
        let mut reader: &[u8] = &[1, 2, 3, 4, 5];
        buf.fill_from(&mut reader, 4).unwrap();
        assert_eq!(&[1, 2, 3, 4], buf.as_slice());
        assert_eq!(0, buf.index());
        assert_eq!(&[5], reader);
    }

    #[test]
    fn fill_from_short_reader_is_eof() {
        let mut buf = ByteBuffer::new();
        let mut reader: &[u8] = &[1, 2, 3];
        assert_eq!(
            io::ErrorKind::UnexpectedEof,
            buf.fill_from(&mut reader, 0x7fff_ffff).unwrap_err().kind()
        );
        assert!(buf.data.capacity() < 1 << 20);
    }

    #[test]
    fn io_traits() {
        let mut buf = ByteBuffer::new();
        buf.write_all(b"histogram").unwrap();

        let mut first = [0_u8; 4];
        buf.read_exact(&mut first).unwrap();
        assert_eq!(b"hist", &first);

        let mut rest = Vec::new();
        buf.read_to_end(&mut rest).unwrap();
        assert_eq!(b"ogram".to_vec(), rest);
    }
}
