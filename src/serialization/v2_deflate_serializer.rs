use super::byte_buffer::ByteBuffer;
use super::v2_serializer::{V2SerializeError, V2Serializer};
use super::{Serializer, V2_COMPRESSED_COOKIE};
use crate::{Counter, Counts, Histogram};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Write};
use std::{error, fmt};
use tracing::trace;

/// Errors that occur during serialization.
#[derive(Debug)]
pub enum V2DeflateSerializeError {
    /// The underlying serialization failed
    InternalSerializationError(V2SerializeError),
    /// An i/o operation failed.
    IoError(io::Error),
}

impl std::convert::From<std::io::Error> for V2DeflateSerializeError {
    fn from(e: std::io::Error) -> Self {
        V2DeflateSerializeError::IoError(e)
    }
}

impl fmt::Display for V2DeflateSerializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            V2DeflateSerializeError::InternalSerializationError(e) => {
                write!(f, "The underlying serialization failed: {}", e)
            }
            V2DeflateSerializeError::IoError(e) => write!(f, "An i/o operation failed: {}", e),
        }
    }
}

impl error::Error for V2DeflateSerializeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            V2DeflateSerializeError::InternalSerializationError(e) => Some(e),
            V2DeflateSerializeError::IoError(e) => Some(e),
        }
    }
}

/// Serializer for the V2 + DEFLATE binary format.
///
/// It's called "deflate" to stay consistent with the naming used by other HdrHistogram
/// implementations, but it actually uses zlib's wrapper format around plain DEFLATE.
#[derive(Default)]
pub struct V2DeflateSerializer {
    compressed_buf: ByteBuffer,
    v2_serializer: V2Serializer,
}

impl V2DeflateSerializer {
    /// Create a new serializer.
    pub fn new() -> V2DeflateSerializer {
        V2DeflateSerializer {
            compressed_buf: ByteBuffer::new(),
            v2_serializer: V2Serializer::new(),
        }
    }
}

impl Serializer for V2DeflateSerializer {
    type SerializeError = V2DeflateSerializeError;

    fn serialize<T: Counter, C: Counts<T>, W: Write>(
        &mut self,
        h: &Histogram<T, C>,
        writer: &mut W,
    ) -> Result<usize, V2DeflateSerializeError> {
        self.compressed_buf.clear();
        let uncompressed = self
            .v2_serializer
            .encode_to_buffer(h)
            .map_err(V2DeflateSerializeError::InternalSerializationError)?;

        self.compressed_buf.put_u32(V2_COMPRESSED_COOKIE);
        // placeholder for length
        self.compressed_buf.put_u32(0);

        {
            // TODO reuse deflate buf, or switch to lower-level flate2::Compress
            let mut compressor = ZlibEncoder::new(&mut self.compressed_buf, Compression::default());
            compressor.write_all(uncompressed)?;
            let _ = compressor.finish()?;
        }

        // Won't underflow since length is always at least 8, and won't overflow u32 as the
        // largest array is about 6 million entries, so about 54MiB encoded.
        let total_compressed_len = self.compressed_buf.len();
        self.compressed_buf
            .set_u32_at(4, (total_compressed_len as u32) - 8);
        trace!(
            uncompressed_len = uncompressed.len(),
            compressed_len = total_compressed_len,
            "Compressed histogram."
        );

        writer.write_all(self.compressed_buf.as_slice())?;

        Ok(total_compressed_len)
    }
}
