//! Error types for the serial RPC client.

use std::fmt;
use std::time::Duration;

use rpclite_codec::Value;
use thiserror::Error;

/// RPClite error code: the request could not be parsed by the firmware.
pub const MALFORMED_CALL_ERR: i64 = 0xFD;
/// RPClite error code: no function is registered under the method name.
pub const FUNCTION_NOT_FOUND_ERR: i64 = 0xFE;
/// RPClite error code: the function itself reported a failure.
pub const GENERIC_ERR: i64 = 0xFF;

/// Errors from the serial connection. All but [`Encode`](Self::Encode) are
/// fatal to the client instance.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The port could not be opened or configured.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        /// Port name.
        port: String,
        /// Underlying serial error.
        source: serialport::Error,
    },

    /// I/O error on an open connection.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client has been closed.
    #[error("connection closed")]
    Closed,

    /// An earlier read failed and the client can no longer be used.
    #[error("connection faulted: {0}")]
    Faulted(String),

    /// The message could not be encoded. Nothing was written.
    #[error(transparent)]
    Encode(#[from] rpclite_codec::EncodeError),
}

/// Errors from [`RpcClient::call`](crate::RpcClient::call).
#[derive(Debug, Error)]
pub enum RpcError {
    /// No matching response arrived before the call deadline.
    #[error("call {id} timed out after {deadline:?}")]
    Timeout {
        /// Correlation id of the abandoned call.
        id: u32,
        /// Deadline that elapsed.
        deadline: Duration,
    },

    /// The remote end answered with an error payload.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// Every correlation id is held by a pending call.
    #[error("no free correlation id")]
    IdsExhausted,

    /// Connection failure while sending or waiting.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Error payload returned by the remote end.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    /// Numeric error code, when the payload carries one.
    pub code: Option<i64>,
    /// Human-readable message.
    pub message: String,
    /// The payload as received.
    pub payload: Value,
}

impl RemoteError {
    /// Interpret an error payload.
    ///
    /// Recognised shapes:
    /// - a string: the message;
    /// - `[code, traceback]` as sent by RPClite firmware;
    /// - a map with an `error` or `message` entry, plus an optional `code`.
    ///
    /// Anything else keeps its display form as the message.
    pub fn from_payload(payload: Value) -> Self {
        let (code, message) = match &payload {
            Value::Str(s) => (None, s.clone()),
            Value::Array(items) if items.len() == 2 && items[0].as_i64().is_some() => {
                let message = match &items[1] {
                    Value::Str(s) => s.clone(),
                    other => other.to_string(),
                };
                (items[0].as_i64(), message)
            }
            Value::Map(_) => {
                let message = payload
                    .map_get("error")
                    .or_else(|| payload.map_get("message"))
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .unwrap_or_else(|| payload.to_string());
                let code = payload.map_get("code").and_then(Value::as_i64);
                (code, message)
            }
            other => (None, other.to_string()),
        };
        RemoteError {
            code,
            message,
            payload,
        }
    }

    /// Whether the firmware reported that the method does not exist.
    pub fn is_function_not_found(&self) -> bool {
        self.code == Some(FUNCTION_NOT_FOUND_ERR)
    }

    /// Whether the firmware rejected the request as malformed (e.g. wrong arity).
    pub fn is_malformed_call(&self) -> bool {
        self.code == Some(MALFORMED_CALL_ERR)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code 0x{:02X})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Result type alias for client operations.
pub type RpcResult<T> = Result<T, RpcError>;
