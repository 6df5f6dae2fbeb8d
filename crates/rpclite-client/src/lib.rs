//! Serial RPC Client for RPClite firmware
//!
//! A blocking client that talks to a microcontroller over a serial port.
//! Requests are correlated with their responses by a 32-bit message id, so
//! several threads may share one [`RpcClient`] and have calls in flight at
//! the same time.
//!
//! # Architecture
//!
//! - [`Connection`]: the byte link. [`SerialConnection`] wraps a real port;
//!   [`MemoryConnection`] is an in-process pair for tests and bridging.
//! - [`RpcClient`]: owns the link, the pending-call table and the message
//!   counter. Every call has a deadline ([`ClientConfig::call_deadline`]).
//! - [`metrics`]: counters for calls, timeouts, remote errors, orphaned
//!   responses and discarded input.
//!
//! # Example
//!
//! ```rust
//! use std::thread;
//! use std::time::Duration;
//!
//! use rpclite_client::{ClientConfig, Connection, MemoryConnection, RpcClient, Value};
//! use rpclite_client::codec::{decode, encode, Envelope};
//!
//! let (host, mut device) = MemoryConnection::pair();
//!
//! // A device that answers one `add` call.
//! let firmware = thread::spawn(move || {
//!     let mut buf = [0u8; 64];
//!     let n = device.read(&mut buf, Duration::from_secs(5)).unwrap();
//!     if let Ok(Envelope::Request { id, args, .. }) = decode(&buf[..n]) {
//!         let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
//!         device.write_frame(&encode(&Envelope::response(id, sum)).unwrap()).unwrap();
//!     }
//! });
//!
//! let client = RpcClient::with_connection(Box::new(host), ClientConfig::new("memory"))?;
//! let sum = client.call("add", vec![Value::from(15), Value::from(7)])?;
//! assert_eq!(sum, Value::from(22));
//! firmware.join().unwrap();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod client;
mod config;
mod connection;
mod error;
mod memory;
pub mod metrics;
mod pending;

pub use client::{NotificationHandler, RpcClient};
pub use config::*;
pub use connection::{Connection, SerialConnection};
pub use error::*;
pub use memory::MemoryConnection;

/// The wire codec this client speaks.
pub use rpclite_codec as codec;
pub use rpclite_codec::{Envelope, Value};
