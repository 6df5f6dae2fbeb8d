//! MessagePack reading and writing for [`Value`].
//!
//! Marker bytes come from `rmp`; payloads are read from a borrowed slice so
//! that running out of input ("need more bytes") can be told apart from
//! input that can never decode.

use std::fmt::Display;

use rmp::encode as enc;
use rmp::Marker;

use crate::{EncodeError, FramingError, Value};

/// Maximum nesting of arrays and maps.
pub const MAX_DEPTH: usize = 32;

/// Why a value could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadError {
    /// The input ends inside the value.
    Incomplete,
    /// The input can never decode as a value.
    Invalid(FramingError),
}

impl From<FramingError> for ReadError {
    fn from(e: FramingError) -> Self {
        ReadError::Invalid(e)
    }
}

// ============================================================================
// Writing
// ============================================================================

fn write_failed<E: Display>(e: E) -> EncodeError {
    EncodeError::Write(e.to_string())
}

/// MessagePack lengths are 32-bit.
fn wire_len(kind: &'static str, len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::TooLong { kind, len })
}

pub(crate) fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Nil => enc::write_nil(buf).map_err(write_failed),
        Value::Bool(b) => enc::write_bool(buf, *b).map_err(write_failed),
        Value::Int(n) => write_int(buf, *n),
        Value::Float(x) => enc::write_f64(buf, *x).map_err(write_failed),
        Value::Str(s) => write_str(buf, s),
        Value::Bin(b) => {
            wire_len("binary", b.len())?;
            enc::write_bin(buf, b).map_err(write_failed)
        }
        Value::Array(items) => write_array(buf, items),
        Value::Map(entries) => {
            let len = wire_len("map", entries.len())?;
            enc::write_map_len(buf, len).map_err(write_failed)?;
            for (k, v) in entries {
                write_value(buf, k)?;
                write_value(buf, v)?;
            }
            Ok(())
        }
    }
}

/// Write an integer in its most compact MessagePack form.
pub(crate) fn write_int(buf: &mut Vec<u8>, n: i64) -> Result<(), EncodeError> {
    enc::write_sint(buf, n).map(drop).map_err(write_failed)
}

pub(crate) fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<(), EncodeError> {
    wire_len("string", s.len())?;
    enc::write_str(buf, s).map_err(write_failed)
}

pub(crate) fn write_array(buf: &mut Vec<u8>, items: &[Value]) -> Result<(), EncodeError> {
    write_array_len(buf, items.len())?;
    for item in items {
        write_value(buf, item)?;
    }
    Ok(())
}

pub(crate) fn write_array_len(buf: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
    let len = wire_len("array", len)?;
    enc::write_array_len(buf, len).map(drop).map_err(write_failed)
}

// ============================================================================
// Reading
// ============================================================================

/// Read one value from the front of `input`.
///
/// Returns the value and the number of bytes it occupied.
pub(crate) fn read_value(input: &[u8]) -> Result<(Value, usize), ReadError> {
    let mut reader = Reader { input, pos: 0 };
    let value = reader.value(0)?;
    Ok((value, reader.pos))
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        if self.remaining() < n {
            return Err(ReadError::Incomplete);
        }
        let bytes = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    fn u32(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    fn u64(&mut self) -> Result<u64, ReadError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    fn value(&mut self, depth: usize) -> Result<Value, ReadError> {
        if depth > MAX_DEPTH {
            return Err(FramingError::DepthExceeded.into());
        }

        let byte = self.u8()?;
        let value = match Marker::from_u8(byte) {
            Marker::FixPos(n) => Value::Int(i64::from(n)),
            Marker::FixNeg(n) => Value::Int(i64::from(n)),
            Marker::Null => Value::Nil,
            Marker::True => Value::Bool(true),
            Marker::False => Value::Bool(false),
            Marker::U8 => Value::Int(i64::from(self.u8()?)),
            Marker::U16 => Value::Int(i64::from(self.u16()?)),
            Marker::U32 => Value::Int(i64::from(self.u32()?)),
            Marker::U64 => {
                let n = self.u64()?;
                Value::Int(i64::try_from(n).map_err(|_| FramingError::IntegerOutOfRange)?)
            }
            Marker::I8 => Value::Int(i64::from(self.u8()? as i8)),
            Marker::I16 => Value::Int(i64::from(self.u16()? as i16)),
            Marker::I32 => Value::Int(i64::from(self.u32()? as i32)),
            Marker::I64 => Value::Int(self.u64()? as i64),
            Marker::F32 => Value::Float(f64::from(f32::from_bits(self.u32()?))),
            Marker::F64 => Value::Float(f64::from_bits(self.u64()?)),
            Marker::FixStr(n) => self.string(usize::from(n))?,
            Marker::Str8 => {
                let len = usize::from(self.u8()?);
                self.string(len)?
            }
            Marker::Str16 => {
                let len = usize::from(self.u16()?);
                self.string(len)?
            }
            Marker::Str32 => {
                let len = self.u32()? as usize;
                self.string(len)?
            }
            Marker::Bin8 => {
                let len = usize::from(self.u8()?);
                Value::Bin(self.take(len)?.to_vec())
            }
            Marker::Bin16 => {
                let len = usize::from(self.u16()?);
                Value::Bin(self.take(len)?.to_vec())
            }
            Marker::Bin32 => {
                let len = self.u32()? as usize;
                Value::Bin(self.take(len)?.to_vec())
            }
            Marker::FixArray(n) => self.array(usize::from(n), depth)?,
            Marker::Array16 => {
                let len = usize::from(self.u16()?);
                self.array(len, depth)?
            }
            Marker::Array32 => {
                let len = self.u32()? as usize;
                self.array(len, depth)?
            }
            Marker::FixMap(n) => self.map(usize::from(n), depth)?,
            Marker::Map16 => {
                let len = usize::from(self.u16()?);
                self.map(len, depth)?
            }
            Marker::Map32 => {
                let len = self.u32()? as usize;
                self.map(len, depth)?
            }
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => return Err(FramingError::UnsupportedType("extension").into()),
            Marker::Reserved => return Err(FramingError::InvalidMarker(byte).into()),
        };
        Ok(value)
    }

    fn string(&mut self, len: usize) -> Result<Value, ReadError> {
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| FramingError::InvalidUtf8)?;
        Ok(Value::Str(s.to_string()))
    }

    fn array(&mut self, len: usize, depth: usize) -> Result<Value, ReadError> {
        // Every element takes at least one byte; never trust the header for capacity.
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.value(depth + 1)?);
        }
        Ok(Value::Array(items))
    }

    fn map(&mut self, len: usize, depth: usize) -> Result<Value, ReadError> {
        let mut entries = Vec::with_capacity(len.min(self.remaining() / 2));
        for _ in 0..len {
            let key = self.value(depth + 1)?;
            let value = self.value(depth + 1)?;
            entries.push((key, value));
        }
        Ok(Value::Map(entries))
    }
}
