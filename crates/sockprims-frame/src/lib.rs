//! Length-prefixed message framing over reliable byte streams.
//!
//! Every message is framed as a 4-byte big-endian payload length followed by
//! exactly that many payload bytes. There is no magic, padding or checksum;
//! the format is byte-exact for interop with other implementations.
//!
//! [`FrameReader`] handles short reads internally: the length prefix and the
//! payload are both accumulated until complete, so callers only ever see whole
//! messages.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_frame, decode_length, encode_frame, encode_length, FrameConfig, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE, READ_CHUNK_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::LengthPrefixCodec;
