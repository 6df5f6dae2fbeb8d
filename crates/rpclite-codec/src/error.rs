//! Codec error types.

use thiserror::Error;

/// A unit of bytes that could not be turned into an envelope.
///
/// Framing errors are recoverable: the stream decoder discards the offending
/// bytes and resumes at the next valid boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Byte is not a valid MessagePack marker.
    #[error("invalid MessagePack marker: 0x{0:02X}")]
    InvalidMarker(u8),

    /// MessagePack type outside the value universe (e.g. extension types).
    #[error("unsupported MessagePack type: {0}")]
    UnsupportedType(&'static str),

    /// String field is not valid UTF-8.
    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    /// Unsigned integer does not fit in an `i64`.
    #[error("integer out of range")]
    IntegerOutOfRange,

    /// Value nesting exceeds [`MAX_DEPTH`](crate::MAX_DEPTH).
    #[error("value nesting too deep")]
    DepthExceeded,

    /// A complete value was decoded but it is not a valid envelope.
    #[error("not an RPC envelope: {0}")]
    NotAnEnvelope(String),

    /// A partial unit grew past the maximum frame length.
    #[error("partial frame too long: maximum {max} bytes, buffered {buffered}")]
    Oversized {
        /// Maximum frame length.
        max: usize,
        /// Bytes buffered when the limit was hit.
        buffered: usize,
    },
}

/// Errors from decoding exactly one envelope with [`decode`](crate::decode).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ends before the envelope is complete.
    #[error("incomplete envelope")]
    Incomplete,

    /// Bytes left over after the envelope.
    #[error("{0} trailing bytes after envelope")]
    Trailing(usize),

    /// Input is not a valid envelope.
    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// Errors from [`encode`](crate::encode).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A string, binary or container is longer than MessagePack can describe.
    #[error("{kind} of length {len} exceeds the MessagePack limit of u32::MAX")]
    TooLong {
        /// What was too long.
        kind: &'static str,
        /// Its length.
        len: usize,
    },

    /// The MessagePack writer failed.
    #[error("MessagePack write failed: {0}")]
    Write(String),
}
