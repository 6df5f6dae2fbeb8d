//! RPC envelopes and their wire layout.

use crate::msgpack::{self, ReadError};
use crate::{DecodeError, EncodeError, FramingError, Value};

/// Type tag of a request envelope.
pub const TYPE_REQUEST: i64 = 0;
/// Type tag of a response envelope.
pub const TYPE_RESPONSE: i64 = 1;
/// Type tag of a notification envelope.
pub const TYPE_NOTIFY: i64 = 2;

/// Fields in a request: `[0, id, method, args]`.
pub const REQUEST_SIZE: usize = 4;
/// Fields in a response: `[1, id, error, result]`.
pub const RESPONSE_SIZE: usize = 4;
/// Fields in the short response form accepted on input: `[1, id, result_or_error]`.
pub const SHORT_RESPONSE_SIZE: usize = 3;
/// Fields in a notification: `[2, method, args]`.
pub const NOTIFY_SIZE: usize = 3;

/// One RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Method invocation that expects a [`Envelope::Response`] with the same `id`.
    Request {
        id: u32,
        method: String,
        args: Vec<Value>,
    },
    /// Reply to a request. `Err` carries the error payload sent by the remote end.
    ///
    /// A nil error payload means success on the wire, so `Err(Value::Nil)`
    /// decodes back as `Ok(Value::Nil)`.
    Response {
        id: u32,
        result: Result<Value, Value>,
    },
    /// Fire-and-forget invocation; no reply is expected.
    Notify { method: String, args: Vec<Value> },
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(id: u32, method: impl Into<String>, args: Vec<Value>) -> Self {
        Envelope::Request {
            id,
            method: method.into(),
            args,
        }
    }

    /// Build a successful response envelope.
    pub fn response(id: u32, result: impl Into<Value>) -> Self {
        Envelope::Response {
            id,
            result: Ok(result.into()),
        }
    }

    /// Build an error response envelope.
    pub fn error_response(id: u32, error: impl Into<Value>) -> Self {
        Envelope::Response {
            id,
            result: Err(error.into()),
        }
    }

    /// Build a notification envelope.
    pub fn notify(method: impl Into<String>, args: Vec<Value>) -> Self {
        Envelope::Notify {
            method: method.into(),
            args,
        }
    }

    /// Wire type tag of this envelope.
    pub fn type_tag(&self) -> i64 {
        match self {
            Envelope::Request { .. } => TYPE_REQUEST,
            Envelope::Response { .. } => TYPE_RESPONSE,
            Envelope::Notify { .. } => TYPE_NOTIFY,
        }
    }

    /// Correlation id, if this envelope carries one.
    pub fn id(&self) -> Option<u32> {
        match self {
            Envelope::Request { id, .. } | Envelope::Response { id, .. } => Some(*id),
            Envelope::Notify { .. } => None,
        }
    }

    /// Interpret a decoded MessagePack value as an envelope.
    pub fn from_value(value: Value) -> Result<Self, FramingError> {
        let Value::Array(items) = value else {
            return Err(not_envelope(format!("expected array, got {}", value.kind())));
        };

        let len = items.len();
        let mut fields = items.into_iter();
        let tag = fields
            .next()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| not_envelope("missing integer type tag"))?;

        match (tag, len) {
            (TYPE_REQUEST, REQUEST_SIZE) => {
                let id = take_id(fields.next())?;
                let method = take_method(fields.next())?;
                let args = take_args(fields.next())?;
                Ok(Envelope::Request { id, method, args })
            }
            (TYPE_RESPONSE, RESPONSE_SIZE) => {
                let id = take_id(fields.next())?;
                let error = fields.next().unwrap_or(Value::Nil);
                let result = fields.next().unwrap_or(Value::Nil);
                let result = if error.is_nil() { Ok(result) } else { Err(error) };
                Ok(Envelope::Response { id, result })
            }
            (TYPE_RESPONSE, SHORT_RESPONSE_SIZE) => {
                let id = take_id(fields.next())?;
                let payload = fields.next().unwrap_or(Value::Nil);
                Ok(Envelope::Response {
                    id,
                    result: split_short_result(payload),
                })
            }
            (TYPE_NOTIFY, NOTIFY_SIZE) => {
                let method = take_method(fields.next())?;
                let args = take_args(fields.next())?;
                Ok(Envelope::Notify { method, args })
            }
            _ => Err(not_envelope(format!(
                "type tag {} with {} fields",
                tag, len
            ))),
        }
    }
}

/// Serialize an envelope.
///
/// Responses always use the four-field layout `[1, id, error, result]`,
/// with nil in whichever slot is unused. Fails only when a string, binary
/// or container is too long for MessagePack; nothing is produced then.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(32);
    match envelope {
        Envelope::Request { id, method, args } => {
            msgpack::write_array_len(&mut buf, REQUEST_SIZE)?;
            msgpack::write_int(&mut buf, TYPE_REQUEST)?;
            msgpack::write_int(&mut buf, i64::from(*id))?;
            msgpack::write_str(&mut buf, method)?;
            msgpack::write_array(&mut buf, args)?;
        }
        Envelope::Response { id, result } => {
            msgpack::write_array_len(&mut buf, RESPONSE_SIZE)?;
            msgpack::write_int(&mut buf, TYPE_RESPONSE)?;
            msgpack::write_int(&mut buf, i64::from(*id))?;
            let nil = Value::Nil;
            let (error, value) = match result {
                Ok(value) => (&nil, value),
                Err(error) => (error, &nil),
            };
            msgpack::write_value(&mut buf, error)?;
            msgpack::write_value(&mut buf, value)?;
        }
        Envelope::Notify { method, args } => {
            msgpack::write_array_len(&mut buf, NOTIFY_SIZE)?;
            msgpack::write_int(&mut buf, TYPE_NOTIFY)?;
            msgpack::write_str(&mut buf, method)?;
            msgpack::write_array(&mut buf, args)?;
        }
    }
    Ok(buf)
}

/// Decode exactly one envelope from `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let (value, used) = msgpack::read_value(bytes).map_err(|e| match e {
        ReadError::Incomplete => DecodeError::Incomplete,
        ReadError::Invalid(e) => DecodeError::Framing(e),
    })?;
    if used < bytes.len() {
        return Err(DecodeError::Trailing(bytes.len() - used));
    }
    Ok(Envelope::from_value(value)?)
}

// ============================================================================
// Field helpers
// ============================================================================

fn not_envelope(reason: impl Into<String>) -> FramingError {
    FramingError::NotAnEnvelope(reason.into())
}

fn take_id(field: Option<Value>) -> Result<u32, FramingError> {
    field
        .as_ref()
        .and_then(Value::as_i64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| not_envelope("message id is not a u32"))
}

fn take_method(field: Option<Value>) -> Result<String, FramingError> {
    match field {
        Some(Value::Str(method)) => Ok(method),
        _ => Err(not_envelope("method name is not a string")),
    }
}

fn take_args(field: Option<Value>) -> Result<Vec<Value>, FramingError> {
    match field {
        Some(Value::Array(args)) => Ok(args),
        _ => Err(not_envelope("arguments are not an array")),
    }
}

/// The three-field response form carries either a result or a map with an
/// `"error"` entry.
fn split_short_result(payload: Value) -> Result<Value, Value> {
    match payload.map_get("error") {
        Some(error) => Err(error.clone()),
        None => Ok(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn test_request_layout() {
        let bytes = encode(&Envelope::request(7, "add", args(&[15, 7]))).unwrap();
        assert_eq!(bytes, b"\x94\x00\x07\xa3add\x92\x0f\x07".to_vec());
    }

    #[test]
    fn test_notify_layout() {
        let bytes = encode(&Envelope::notify("add", args(&[5, 9]))).unwrap();
        assert_eq!(bytes, b"\x93\x02\xa3add\x92\x05\x09".to_vec());
    }

    #[test]
    fn test_response_layouts() {
        assert_eq!(
            encode(&Envelope::response(3, 22)).unwrap(),
            vec![0x94, 0x01, 0x03, 0xc0, 0x16]
        );
        assert_eq!(
            encode(&Envelope::error_response(3, "boom")).unwrap(),
            b"\x94\x01\x03\xa4boom\xc0".to_vec()
        );
    }

    #[test]
    fn test_round_trip_each_variant() {
        let envelopes = vec![
            Envelope::request(u32::MAX, "greet", vec![]),
            Envelope::response(0, Value::Array(args(&[1, -2, 300]))),
            Envelope::error_response(1, Value::Array(vec![Value::Int(0xFE), "nope".into()])),
            Envelope::notify("led", vec![Value::Bool(true), Value::Float(0.25)]),
        ];
        for envelope in envelopes {
            assert_eq!(decode(&encode(&envelope).unwrap()), Ok(envelope));
        }
    }

    #[test]
    fn test_short_response_form() {
        // [1, 4, 22]
        assert_eq!(
            decode(&[0x93, 0x01, 0x04, 0x16]),
            Ok(Envelope::response(4, 22))
        );

        // [1, 5, {"error": "wrong arity"}]
        let mut bytes = vec![0x93, 0x01, 0x05, 0x81, 0xa5];
        bytes.extend_from_slice(b"error");
        bytes.push(0xab);
        bytes.extend_from_slice(b"wrong arity");
        assert_eq!(
            decode(&bytes),
            Ok(Envelope::error_response(5, "wrong arity"))
        );
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        // plain integer
        assert!(matches!(
            decode(&[0x05]),
            Err(DecodeError::Framing(FramingError::NotAnEnvelope(_)))
        ));
        // unknown tag 7
        assert!(matches!(
            decode(&[0x93, 0x07, 0xa1, b'x', 0x90]),
            Err(DecodeError::Framing(FramingError::NotAnEnvelope(_)))
        ));
        // request with negative id
        assert!(matches!(
            decode(&[0x94, 0x00, 0xff, 0xa1, b'x', 0x90]),
            Err(DecodeError::Framing(FramingError::NotAnEnvelope(_)))
        ));
        // notify whose args are not an array
        assert!(matches!(
            decode(&[0x93, 0x02, 0xa1, b'x', 0x01]),
            Err(DecodeError::Framing(FramingError::NotAnEnvelope(_)))
        ));
    }

    #[test]
    fn test_decode_incomplete_and_trailing() {
        let bytes = encode(&Envelope::notify("x", vec![])).unwrap();
        assert_eq!(decode(&bytes[..bytes.len() - 1]), Err(DecodeError::Incomplete));

        let mut extra = bytes.clone();
        extra.push(0xc0);
        assert_eq!(decode(&extra), Err(DecodeError::Trailing(1)));
    }

    #[test]
    fn test_id_accessor() {
        assert_eq!(Envelope::request(9, "m", vec![]).id(), Some(9));
        assert_eq!(Envelope::response(9, 1).id(), Some(9));
        assert_eq!(Envelope::notify("m", vec![]).id(), None);
    }
}
