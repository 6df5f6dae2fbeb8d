//! RPClite Wire Codec
//!
//! This crate maps RPC envelopes to and from the compact binary representation
//! spoken by RPClite firmware over a serial link. Every envelope is a single
//! self-delimiting MessagePack array, so no extra length prefix is needed on
//! the wire.
//!
//! # Message Types
//!
//! - **Request** (host → firmware): `[0, id, method, args]`
//! - **Response** (firmware → host): `[1, id, error, result]`
//! - **Notify** (either direction): `[2, method, args]`
//!
//! # Example
//!
//! ```rust
//! use rpclite_codec::{decode_stream, encode, Envelope, Value};
//!
//! let request = Envelope::request(0, "add", vec![Value::from(15), Value::from(7)]);
//! let bytes = encode(&request)?;
//!
//! // A reader may see only part of a frame at a time.
//! let decoded = decode_stream(&bytes[..3]);
//! assert!(decoded.envelopes.is_empty());
//! assert_eq!(decoded.remaining, &bytes[..3]);
//!
//! let decoded = decode_stream(&bytes);
//! assert_eq!(decoded.envelopes, vec![request]);
//! assert!(decoded.remaining.is_empty());
//! # Ok::<(), rpclite_codec::EncodeError>(())
//! ```

mod envelope;
mod error;
mod msgpack;
mod stream;
mod value;

pub use envelope::*;
pub use msgpack::MAX_DEPTH;
pub use error::*;
pub use stream::*;
pub use value::*;
