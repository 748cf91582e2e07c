//! Ordered request parameters.

use indexmap::IndexMap;
use std::fmt;

use crate::error::RequestError;
use crate::multipart::MultipartPart;

/// A single parameter value.
///
/// Scalars stringify the natural way (`10`, `true`, `0.5`). `Part` is only
/// valid in a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Part(MultipartPart),
}

impl ParamValue {
    /// String form used in queries, url-encoded bodies and OAuth signing.
    pub fn to_param_string(&self, key: &str) -> Result<String, RequestError> {
        match self {
            ParamValue::String(s) => Ok(s.clone()),
            ParamValue::Int(i) => Ok(i.to_string()),
            ParamValue::Float(f) => Ok(f.to_string()),
            ParamValue::Bool(b) => Ok(b.to_string()),
            ParamValue::Part(_) => Err(RequestError::invalid_parameter(
                key,
                "multipart part is only allowed in a multipart body",
            )),
        }
    }

    /// The multipart part, if this value is one.
    pub fn as_part(&self) -> Option<&MultipartPart> {
        match self {
            ParamValue::Part(part) => Some(part),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Part(part) => write!(f, "<part {}>", part.name()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::String(value.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<MultipartPart> for ParamValue {
    fn from(value: MultipartPart) -> Self {
        ParamValue::Part(value)
    }
}

/// Parameters keyed by name, kept in insertion order.
///
/// Order is carried through to queries, url-encoded bodies, JSON objects and
/// multipart bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(IndexMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter. Re-inserting a key replaces the value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, ParamValue> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Insert every entry of `other`, in its order.
    pub fn extend_from(&mut self, other: &Parameters) {
        for (k, v) in other {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Stringify every value, failing on the first one that is not a scalar.
    pub fn to_pairs(&self) -> Result<Vec<(String, String)>, RequestError> {
        self.iter()
            .map(|(k, v)| v.to_param_string(k).map(|s| (k.clone(), s)))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Parameters(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = indexmap::map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build [`Parameters`] in order.
///
/// ```rust
/// let params = skylark_client::params! { "q" => "rust", "count" => 10 };
/// assert_eq!(params.keys().collect::<Vec<_>>(), ["q", "count"]);
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::Parameters::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Parameters::new();
        $( params.insert($key, $value); )+
        params
    }};
}
