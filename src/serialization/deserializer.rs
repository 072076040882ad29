use super::byte_buffer::ByteBuffer;
use super::varint::{varint_read_slice, zig_zag_decode, MAX_VARINT_LEN};
use super::{zig_zag, V2_COMPRESSED_COOKIE, V2_COOKIE};
use crate::{Counter, Counts, Histogram, RestatState};
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use num_traits::ToPrimitive;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::{self, error, fmt};
use tracing::trace;

/// Errors that can happen during deserialization.
///
/// No partially decoded histogram is ever returned alongside an error.
#[derive(Debug)]
pub enum DeserializeError {
    /// An i/o operation failed.
    IoError(io::Error),
    /// The cookie (first 4 bytes) did not match that for any supported format.
    InvalidCookie,
    /// The histogram uses features that this implementation doesn't support (yet), so it cannot
    /// be deserialized correctly.
    UnsupportedFeature,
    /// A count exceeded what can be represented in the chosen counter type.
    UnsuitableCounterType,
    /// The histogram instance could not be created because the serialized parameters were invalid
    /// (e.g. lowest value, highest value, etc.)
    InvalidParameters,
    /// The current system's pointer width cannot represent the encoded histogram.
    UsizeTypeTooSmall,
    /// The encoded array is longer than it should be for the histogram's value range.
    EncodedArrayTooLong,
    /// The input ended before the declared payload did, possibly in the middle of a number.
    TruncatedPayload,
    /// There were bytes left over after the declared payload.
    TrailingBytes,
    /// The text form was not valid base64.
    InvalidBase64,
}

impl std::convert::From<std::io::Error> for DeserializeError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DeserializeError::TruncatedPayload
        } else {
            DeserializeError::IoError(e)
        }
    }
}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeserializeError::IoError(e) => write!(f, "An i/o operation failed: {}", e),
            DeserializeError::InvalidCookie => write!(
                f,
                "The cookie (first 4 bytes) did not match that for any supported format"
            ),
            DeserializeError::UnsupportedFeature => write!(
                f,
                "The histogram uses features that this implementation doesn't support"
            ),
            DeserializeError::UnsuitableCounterType => write!(
                f,
                "A count exceeded what can be represented in the chosen counter type"
            ),
            DeserializeError::InvalidParameters => write!(
                f,
                "The serialized parameters were invalid (e.g. lowest value, highest value, etc)"
            ),
            DeserializeError::UsizeTypeTooSmall => write!(
                f,
                "The current system's pointer width cannot represent the encoded histogram"
            ),
            DeserializeError::EncodedArrayTooLong => write!(
                f,
                "The encoded array is longer than it should be for the histogram's value range"
            ),
            DeserializeError::TruncatedPayload => {
                write!(f, "The input ended before the declared payload")
            }
            DeserializeError::TrailingBytes => {
                write!(f, "There were bytes left over after the declared payload")
            }
            DeserializeError::InvalidBase64 => write!(f, "The text form was not valid base64"),
        }
    }
}

impl error::Error for DeserializeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            DeserializeError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

/// Deserializer for all supported formats.
///
/// Since the serialization formats all include some magic bytes that allow reliable identification
/// of the different formats, only one Deserializer implementation is needed.
#[derive(Default)]
pub struct Deserializer {
    payload_buf: ByteBuffer,
}

impl Deserializer {
    /// Create a new deserializer.
    pub fn new() -> Deserializer {
        Deserializer {
            payload_buf: ByteBuffer::new(),
        }
    }

    /// Deserialize an encoded histogram from the provided reader.
    ///
    /// The counts storage is picked by the caller, so the same bytes can be read into a
    /// `Histogram` or a `PackedHistogram`. The returned histogram does not auto-resize.
    ///
    /// Note that `&[u8]` and `Cursor` are convenient implementations of `Read` if you have some
    /// bytes already in slice or `Vec` form.
    pub fn deserialize<T: Counter, C: Counts<T>, R: Read>(
        &mut self,
        reader: &mut R,
    ) -> Result<Histogram<T, C>, DeserializeError> {
        let cookie = reader.read_u32::<BigEndian>()?;

        match cookie {
            V2_COOKIE => self.deser_v2(reader),
            V2_COMPRESSED_COOKIE => self.deser_v2_compressed(reader),
            _ => Err(DeserializeError::InvalidCookie),
        }
    }

    fn deser_v2_compressed<T: Counter, C: Counts<T>, R: Read>(
        &mut self,
        reader: &mut R,
    ) -> Result<Histogram<T, C>, DeserializeError> {
        let payload_len = reader
            .read_u32::<BigEndian>()?
            .to_usize()
            .ok_or(DeserializeError::UsizeTypeTooSmall)?;
        trace!(compressed_len = payload_len, "Decoding compressed histogram.");

        // TODO reuse deflate buf, or switch to lower-level flate2::Decompress
        let mut deflate_reader = ZlibDecoder::new(reader.take(payload_len as u64));
        let inner_cookie = deflate_reader.read_u32::<BigEndian>()?;
        if inner_cookie != V2_COOKIE {
            return Err(DeserializeError::InvalidCookie);
        }

        let h = self.deser_v2(&mut deflate_reader)?;

        // the inflated stream holds exactly one histogram
        if deflate_reader.read(&mut [0_u8; 1])? != 0 {
            return Err(DeserializeError::TrailingBytes);
        }
        Ok(h)
    }

    #[allow(clippy::float_cmp)]
    fn deser_v2<T: Counter, C: Counts<T>, R: Read>(
        &mut self,
        reader: &mut R,
    ) -> Result<Histogram<T, C>, DeserializeError> {
        let payload_len = reader
            .read_u32::<BigEndian>()?
            .to_usize()
            .ok_or(DeserializeError::UsizeTypeTooSmall)?;
        let normalizing_offset = reader.read_u32::<BigEndian>()?;
        if normalizing_offset != 0 {
            return Err(DeserializeError::UnsupportedFeature);
        }
        let num_digits = reader
            .read_u32::<BigEndian>()?
            .to_u8()
            .ok_or(DeserializeError::InvalidParameters)?;
        let low = reader.read_u64::<BigEndian>()?;
        let high = reader.read_u64::<BigEndian>()?;
        let int_double_ratio = reader.read_f64::<BigEndian>()?;
        if int_double_ratio != 1.0 {
            return Err(DeserializeError::UnsupportedFeature);
        }

        let mut h: Histogram<T, C> = Histogram::new_with_bounds(low, high, num_digits)
            .map_err(|_| DeserializeError::InvalidParameters)?;
        trace!(
            payload_len,
            low,
            high,
            sigfig = num_digits,
            "Decoding histogram payload."
        );

        self.payload_buf.fill_from(reader, payload_len)?;
        let payload_slice = self.payload_buf.as_slice();

        let mut payload_index: usize = 0;
        let mut restat_state = RestatState::new();
        let mut decode_state = DecodeLoopState::new();

        while payload_index < payload_len.saturating_sub(MAX_VARINT_LEN) {
            // Read with fast loop until we are within 9 of the end. Fast loop can't handle EOF,
            // so bail to slow version for the last few bytes.

            // payload_index math is safe because payload_len is a usize
            let (zz_num, bytes_read) = varint_read_slice(
                &payload_slice[payload_index..(payload_index + MAX_VARINT_LEN)],
            );
            payload_index += bytes_read;

            let count_or_zeros = zig_zag_decode(zz_num);

            decode_state.on_decoded_num(count_or_zeros, &mut restat_state, &mut h)?;
        }

        // Now read the leftovers
        self.payload_buf.set_index(payload_index);
        while self.payload_buf.remaining() > 0 {
            let count_or_zeros = zig_zag::decode(&mut self.payload_buf)?;

            decode_state.on_decoded_num(count_or_zeros, &mut restat_state, &mut h)?;
        }

        restat_state.update_histogram(&mut h);

        Ok(h)
    }
}

/// We need to perform the same logic in two different decode loops while carrying over a modicum
/// of state.
struct DecodeLoopState<T: Counter> {
    dest_index: usize,
    phantom: PhantomData<T>,
}

impl<T: Counter> DecodeLoopState<T> {
    fn new() -> DecodeLoopState<T> {
        DecodeLoopState {
            dest_index: 0,
            phantom: PhantomData,
        }
    }

    #[inline]
    fn on_decoded_num<C: Counts<T>>(
        &mut self,
        count_or_zeros: i64,
        restat_state: &mut RestatState<T>,
        h: &mut Histogram<T, C>,
    ) -> Result<(), DeserializeError> {
        if count_or_zeros < 0 {
            let zero_count = count_or_zeros
                .checked_neg()
                .and_then(|n| n.to_usize())
                .ok_or(DeserializeError::EncodedArrayTooLong)?;
            // skip the zeros
            self.dest_index = self
                .dest_index
                .checked_add(zero_count)
                .filter(|&i| i <= h.counts.len())
                .ok_or(DeserializeError::EncodedArrayTooLong)?;
        } else {
            if self.dest_index >= h.counts.len() {
                return Err(DeserializeError::EncodedArrayTooLong);
            }

            let count: T =
                T::from_i64(count_or_zeros).ok_or(DeserializeError::UnsuitableCounterType)?;

            if count > T::zero() {
                h.counts.set(self.dest_index, count);
                restat_state.on_nonzero_count(self.dest_index, count);
            }

            self.dest_index += 1;
        }

        Ok(())
    }
}
