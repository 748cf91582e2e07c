//! `multipart/form-data` body encoding (RFC 7578 framing over RFC 2046).

use bytes::Bytes;
use std::fmt;

use crate::error::RequestError;
use crate::params::Parameters;

/// Prefix of every generated boundary.
pub const BOUNDARY_PREFIX: &str = "skylark-boundary-";

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    /// A plain form field.
    Value { name: String, value: String },
    /// A binary attachment. An empty `mime_type` omits the `Content-Type` line.
    Data {
        name: String,
        data: Bytes,
        filename: String,
        mime_type: String,
    },
}

impl MultipartPart {
    /// A plain field holding the string form of `value`.
    pub fn value(name: impl Into<String>, value: impl fmt::Display) -> Self {
        MultipartPart::Value {
            name: name.into(),
            value: value.to_string(),
        }
    }

    /// A binary attachment.
    pub fn data(
        name: impl Into<String>,
        data: impl Into<Bytes>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        MultipartPart::Data {
            name: name.into(),
            data: data.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MultipartPart::Value { name, .. } | MultipartPart::Data { name, .. } => name,
        }
    }

    fn write_to(&self, boundary: &str, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match self {
            MultipartPart::Value { name, value } => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", quote(name)).as_bytes(),
                );
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(value.as_bytes());
            }
            MultipartPart::Data {
                name,
                data,
                filename,
                mime_type,
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        quote(name),
                        quote(filename)
                    )
                    .as_bytes(),
                );
                if !mime_type.is_empty() {
                    out.extend_from_slice(format!("Content-Type: {mime_type}\r\n").as_bytes());
                }
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
}

// Quoted-string values escape the characters that would end the header early.
fn quote(s: &str) -> String {
    s.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

/// Boundary built from a random token.
pub fn boundary_from_token(token: &str) -> String {
    format!("{BOUNDARY_PREFIX}{token}")
}

/// `Content-Type` header value for a multipart body.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

/// Encode parts in order, followed by the closing delimiter.
pub fn encode<'a, I>(parts: I, boundary: &str) -> Vec<u8>
where
    I: IntoIterator<Item = &'a MultipartPart>,
{
    let mut out = Vec::new();
    for part in parts {
        part.write_to(boundary, &mut out);
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

/// Encode every parameter value as a part, in parameter order.
///
/// Fails with [`RequestError::InvalidParameter`] on the first value that is
/// not a [`MultipartPart`].
pub fn encode_parameters(params: &Parameters, boundary: &str) -> Result<Vec<u8>, RequestError> {
    let parts = params
        .iter()
        .map(|(key, value)| {
            value
                .as_part()
                .ok_or_else(|| RequestError::invalid_parameter(key.as_str(), "expected a multipart part"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encode(parts, boundary))
}
