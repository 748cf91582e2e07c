//! Parameter and body encoding.
//!
//! Queries and `application/x-www-form-urlencoded` bodies share one
//! percent-encoding rule: everything outside the RFC 3986 unreserved set is
//! escaped, so a space is always `%20`, never `+`. OAuth signing uses the same
//! rule.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};

use crate::error::RequestError;
use crate::params::{ParamValue, Parameters};

/// Characters escaped by [`percent_encode`]: all but `A-Z a-z 0-9 - . _ ~`.
pub const RFC3986_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Percent-encode a string per RFC 3986.
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, RFC3986_RESERVED).to_string()
}

/// `k=v&k=v` in parameter order, keys and values percent-encoded.
pub fn query_string(params: &Parameters) -> Result<String, RequestError> {
    let pairs = params.to_pairs()?;
    Ok(pairs
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&"))
}

/// Body bytes for `application/x-www-form-urlencoded`.
pub fn form_body(params: &Parameters) -> Result<Vec<u8>, RequestError> {
    query_string(params).map(String::into_bytes)
}

/// Body bytes for `application/json`: the parameters as one JSON object, keys
/// in parameter order.
pub fn json_body(params: &Parameters) -> Result<Vec<u8>, RequestError> {
    serde_json::to_vec(&JsonObject(params)).map_err(RequestError::from)
}

struct JsonObject<'a>(&'a Parameters);

impl Serialize for JsonObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, &JsonValue { key, value })?;
        }
        map.end()
    }
}

struct JsonValue<'a> {
    key: &'a str,
    value: &'a ParamValue,
}

impl Serialize for JsonValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            ParamValue::String(s) => serializer.serialize_str(s),
            ParamValue::Int(i) => serializer.serialize_i64(*i),
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            ParamValue::Float(f) => Err(S::Error::custom(format!(
                "`{}` holds {f}, which JSON cannot represent",
                self.key
            ))),
            ParamValue::Part(_) => Err(S::Error::custom(format!(
                "`{}` holds a multipart part, which JSON cannot represent",
                self.key
            ))),
        }
    }
}
