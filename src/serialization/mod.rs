//! The V2 wire format, plain or DEFLATE-compressed.
//!
//! Both forms are byte compatible with the other HdrHistogram implementations. Multi-byte header
//! fields are big-endian. The counts payload is a sequence of zig-zag LEB128-64b9B varints, where
//! a negative number stands for a run of that many empty indices.
//!
//! A plain V2 histogram is a 40 byte header followed by the payload:
//!
//! <pre>
//! cookie (u32) | payload length (u32) | normalizing offset (u32) | significant digits (u32)
//! lowest discernible value (u64) | highest trackable value (u64) | integer to double ratio (f64)
//! </pre>
//!
//! The compressed form is a different cookie, the compressed length, and a zlib stream holding a
//! complete plain V2 histogram.
//!
//! Encoding only writes counts up to the highest populated index, so the size depends on how many
//! distinct values were recorded and how they are spread, not on the configured range. The same
//! histogram encodes to the same bytes regardless of whether it keeps dense or packed counts, and
//! the reading side picks its storage with a type annotation.
//!
//! # Usage
//!
//! [`V2Serializer`] and [`V2DeflateSerializer`] write to any `Write`, and the single
//! [`Deserializer`] reads either form from any `Read`, telling them apart by the cookie. All of
//! them keep internal buffers around, so reuse them when handling many histograms.
//!
//! ```
//! use packed_hdrhistogram::{Histogram, PackedHistogram};
//! use packed_hdrhistogram::serialization::{Deserializer, Serializer, V2DeflateSerializer};
//! use std::io::Cursor;
//!
//! let mut buf = Vec::new();
//! let mut serializer = V2DeflateSerializer::new();
//! for minute in 1..=3 {
//!     let mut h = PackedHistogram::<u64>::new(3).unwrap();
//!     h.record_n(250 * minute, 10).unwrap();
//!     serializer.serialize(&h, &mut buf).unwrap();
//! }
//!
//! let mut deserializer = Deserializer::new();
//! let mut cursor = Cursor::new(&buf);
//! let mut hour = Histogram::<u64>::new(3).unwrap();
//! for _ in 0..3 {
//!     let h: PackedHistogram<u64> = deserializer.deserialize(&mut cursor).unwrap();
//!     hour.add(&h).unwrap();
//! }
//! assert_eq!(30, hour.len());
//! ```
//!
//! For one-off use there are the slice-level [`encode`] and [`decode`], and the base64 forms
//! [`encode_into_compressed_base64`] and [`decode_from_compressed_base64`] that log formats embed.
//! `decode` is strict: bytes beyond the declared payload are an error.
//!
//! ```
//! use packed_hdrhistogram::{Histogram, PackedHistogram};
//! use packed_hdrhistogram::serialization::{decode, encode};
//!
//! let mut packed = PackedHistogram::<u64>::new_with_bounds(1, 3_600_000_000, 3).unwrap();
//! packed.record_n(1_000, 3).unwrap();
//!
//! let bytes = encode(&packed, true).unwrap();
//! let dense: Histogram<u64> = decode(&bytes).unwrap();
//! assert_eq!(dense, packed);
//! ```
//!
//! To send a histogram through serde, wrap it in a newtype whose `Serialize` impl calls one of
//! the serializers and hands the bytes to `serialize_bytes`.

use std::io::{self, Cursor};

use super::{Counter, Counts, Histogram};


mod byte_buffer;
pub use self::byte_buffer::ByteBuffer;

pub mod zig_zag;

mod varint;
pub use self::varint::{
    encoded_len, varint_read, varint_read_slice, varint_write, zig_zag_decode, zig_zag_encode,
};

mod v2_serializer;
pub use self::v2_serializer::{V2SerializeError, V2Serializer};

mod v2_deflate_serializer;
pub use self::v2_deflate_serializer::{V2DeflateSerializeError, V2DeflateSerializer};

mod deserializer;
pub use self::deserializer::{DeserializeError, Deserializer};

const V2_COOKIE_BASE: u32 = 0x1c84_9303;
const V2_COMPRESSED_COOKIE_BASE: u32 = 0x1c84_9304;

/// Leading 4 bytes of an uncompressed V2 histogram.
pub const V2_COOKIE: u32 = V2_COOKIE_BASE | 0x10;
/// Leading 4 bytes of a V2 + DEFLATE histogram.
pub const V2_COMPRESSED_COOKIE: u32 = V2_COMPRESSED_COOKIE_BASE | 0x10;

/// Size of the uncompressed V2 header that precedes the counts payload.
pub const V2_HEADER_SIZE: usize = 40;

/// Histogram serializer.
///
/// Different implementations serialize to different formats.
pub trait Serializer {
    /// Error type returned when serialization fails.
    type SerializeError: std::fmt::Debug;

    /// Serialize the histogram into the provided writer.
    /// Returns the number of bytes written, or an error.
    ///
    /// Note that `Vec<u8>` is a reasonable `Write` implementation for simple usage.
    fn serialize<T: Counter, C: Counts<T>, W: io::Write>(
        &mut self,
        h: &Histogram<T, C>,
        writer: &mut W,
    ) -> Result<usize, Self::SerializeError>;
}

/// Encode `h` into a new buffer, in V2 + DEFLATE form if `compressed`, plain V2 otherwise.
///
/// Errors from the plain V2 encoding are reported as
/// `V2DeflateSerializeError::InternalSerializationError`.
pub fn encode<T: Counter, C: Counts<T>>(
    h: &Histogram<T, C>,
    compressed: bool,
) -> Result<Vec<u8>, V2DeflateSerializeError> {
    let mut buf = Vec::new();
    if compressed {
        V2DeflateSerializer::new().serialize(h, &mut buf)?;
    } else {
        V2Serializer::new()
            .serialize(h, &mut buf)
            .map_err(V2DeflateSerializeError::InternalSerializationError)?;
    }
    Ok(buf)
}

/// Decode a histogram in either format from `bytes`, which must hold exactly one encoded
/// histogram.
pub fn decode<T: Counter, C: Counts<T>>(bytes: &[u8]) -> Result<Histogram<T, C>, DeserializeError> {
    // Both formats declare their length after the cookie. The zlib reader may buffer past its
    // stream, so the cursor position alone can't tell where a compressed histogram ends.
    if bytes.len() >= 8 {
        let declared_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let header_len = match u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) {
            V2_COOKIE => Some(V2_HEADER_SIZE),
            V2_COMPRESSED_COOKIE => Some(8),
            _ => None,
        };
        if let Some(header_len) = header_len {
            let expected_len = header_len.saturating_add(declared_len);
            if bytes.len() < expected_len {
                return Err(DeserializeError::TruncatedPayload);
            }
            if bytes.len() > expected_len {
                return Err(DeserializeError::TrailingBytes);
            }
        }
    }

    Deserializer::new().deserialize(&mut Cursor::new(bytes))
}

/// Encode `h` as V2 + DEFLATE and then base64, the textual form used by histogram log formats.
pub fn encode_into_compressed_base64<T: Counter, C: Counts<T>>(
    h: &Histogram<T, C>,
) -> Result<String, V2DeflateSerializeError> {
    encode(h, true).map(base64::encode)
}

/// Inverse of `encode_into_compressed_base64`. Plain V2 inside the base64 is accepted as well.
pub fn decode_from_compressed_base64<T: Counter, C: Counts<T>>(
    text: &str,
) -> Result<Histogram<T, C>, DeserializeError> {
    let bytes = base64::decode(text.trim()).map_err(|_| DeserializeError::InvalidBase64)?;
    decode(&bytes)
}
