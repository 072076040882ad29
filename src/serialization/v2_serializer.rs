use super::byte_buffer::ByteBuffer;
use super::varint::MAX_VARINT_LEN;
use super::{zig_zag, Serializer, V2_COOKIE, V2_HEADER_SIZE};
use crate::{Counter, Counts, Histogram};
use std::io::{self, Write};
use std::{error, fmt};

/// Errors that occur during serialization.
#[derive(Debug)]
pub enum V2SerializeError {
    /// A count above i64::max_value() cannot be zig-zag encoded, and therefore cannot be
    /// serialized.
    CountNotSerializable,
    /// Internal calculations cannot be represented in `usize`. Use smaller histograms or beefier
    /// hardware.
    UsizeTypeTooSmall,
    /// An i/o operation failed.
    IoError(io::Error),
}

impl std::convert::From<std::io::Error> for V2SerializeError {
    fn from(e: std::io::Error) -> Self {
        V2SerializeError::IoError(e)
    }
}

impl fmt::Display for V2SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            V2SerializeError::CountNotSerializable => write!(
                f,
                "A count above i64::max_value() cannot be zig-zag encoded"
            ),
            V2SerializeError::UsizeTypeTooSmall => {
                write!(f, "Internal calculations cannot be represented in `usize`")
            }
            V2SerializeError::IoError(e) => write!(f, "An i/o operation failed: {}", e),
        }
    }
}

impl error::Error for V2SerializeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            V2SerializeError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

/// Serializer for the V2 binary format.
#[derive(Default)]
pub struct V2Serializer {
    buf: ByteBuffer,
}

impl V2Serializer {
    /// Create a new serializer.
    pub fn new() -> V2Serializer {
        V2Serializer {
            buf: ByteBuffer::new(),
        }
    }

    /// Encode `h` into the internal buffer and return the encoded bytes.
    pub(crate) fn encode_to_buffer<T: Counter, C: Counts<T>>(
        &mut self,
        h: &Histogram<T, C>,
    ) -> Result<&[u8], V2SerializeError> {
        self.buf.clear();
        max_encoded_size(h).ok_or(V2SerializeError::UsizeTypeTooSmall)?;

        self.buf.put_u32(V2_COOKIE);
        // placeholder for length
        self.buf.put_u32(0);
        // normalizing index offset
        self.buf.put_u32(0);
        self.buf.put_u32(u32::from(h.significant_value_digits));
        self.buf.put_u64(h.lowest_discernible_value);
        self.buf.put_u64(h.highest_trackable_value);
        // int to double conversion
        self.buf.put_f64(1.0);

        debug_assert_eq!(V2_HEADER_SIZE, self.buf.len());

        let counts_len = encode_counts(h, &mut self.buf)?;
        // counts is always under 2^24
        self.buf.set_u32_at(4, counts_len as u32);

        Ok(self.buf.as_slice())
    }
}

impl Serializer for V2Serializer {
    type SerializeError = V2SerializeError;

    fn serialize<T: Counter, C: Counts<T>, W: Write>(
        &mut self,
        h: &Histogram<T, C>,
        writer: &mut W,
    ) -> Result<usize, V2SerializeError> {
        let bytes = self.encode_to_buffer(h)?;
        writer
            .write_all(bytes)
            .map(|_| bytes.len())
            .map_err(V2SerializeError::IoError)
    }
}

fn max_encoded_size<T: Counter, C: Counts<T>>(h: &Histogram<T, C>) -> Option<usize> {
    h.index_for(h.max())
        .and_then(|i| counts_array_max_encoded_size(i + 1))
        .and_then(|x| x.checked_add(V2_HEADER_SIZE))
}

/// Upper bound on the encoded size of `length` counts.
pub(crate) fn counts_array_max_encoded_size(length: usize) -> Option<usize> {
    // Won't overflow (except sometimes on 16 bit systems) because largest possible counts
    // len is 47 buckets, each with 2^17 half count, for a total of 6e6. This product will
    // therefore be about 5e7 (50 million) at most.
    length.checked_mul(MAX_VARINT_LEN)
}

/// Append the counts up to and including the max value's index to `buf`. Returns the number of
/// bytes appended.
///
/// Non-negative numbers are counts for the respective index; negative numbers skip that many
/// (absolute value) zero counts. A single zero is written as a count of 0.
pub(crate) fn encode_counts<T: Counter, C: Counts<T>>(
    h: &Histogram<T, C>,
    buf: &mut ByteBuffer,
) -> Result<usize, V2SerializeError> {
    let index_limit = h
        .index_for(h.max())
        .expect("Index for max value must exist");
    let mut index = 0;
    let mut bytes_written = 0;

    assert!(index_limit < h.counts.len());

    while index <= index_limit {
        let count = h.counts.get(index);
        index += 1;

        let mut zero_count: i64 = 0;
        if count == T::zero() {
            zero_count = 1;

            while index <= index_limit && h.counts.get(index) == T::zero() {
                zero_count += 1;
                index += 1;
            }
        }

        let count_or_zeros: i64 = if zero_count > 1 {
            // zero count can be at most the entire counts array, which is at most 2^24, so will
            // fit.
            -zero_count
        } else {
            // Counts beyond i63 max are reported rather than silently truncated.
            count
                .to_i64()
                .ok_or(V2SerializeError::CountNotSerializable)?
        };

        bytes_written += zig_zag::encode(buf, count_or_zeros);
    }

    Ok(bytes_written)
}
