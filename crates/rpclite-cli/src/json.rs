//! Conversion between command-line JSON and RPC values.

use rpclite_client::Value;
use serde_json::{Map, Number, Value as Json};

/// Parse one command-line argument. Anything that is not valid JSON is
/// passed through as a string, so `hello` and `"hello"` mean the same.
pub fn parse_arg(arg: &str) -> Value {
    match serde_json::from_str::<Json>(arg) {
        Ok(json) => from_json(json),
        Err(_) => Value::Str(arg.to_string()),
    }
}

pub fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            // Beyond i64 or fractional.
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        Json::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (Value::Str(k), from_json(v)))
                .collect(),
        ),
    }
}

/// Render a value as JSON.
///
/// Binary becomes a hex string, non-string map keys use their display form
/// and non-finite floats become null.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s.clone()),
        Value::Bin(bytes) => Json::String(hex::encode(bytes)),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = match k {
                    Value::Str(s) => s.clone(),
                    other => other.to_string(),
                };
                map.insert(key, to_json(v));
            }
            Json::Object(map)
        }
    }
}
