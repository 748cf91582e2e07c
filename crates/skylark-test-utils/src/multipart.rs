//! Decoding multipart/form-data bodies with `multer` for assertions.

use bytes::Bytes;
use futures_util::stream;
use std::convert::Infallible;

/// One decoded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Decode `body` framed with `boundary`, parts in wire order.
///
/// Fails on malformed framing. A part without a name decodes with an empty
/// one.
pub async fn parse_multipart(body: impl Into<Bytes>, boundary: &str) -> Result<Vec<ParsedPart>, multer::Error> {
    let body: Bytes = body.into();
    let source = stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(source, boundary);

    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(|mime| mime.to_string());
        let body = field.bytes().await?.to_vec();
        parts.push(ParsedPart {
            name,
            filename,
            content_type,
            body,
        });
    }
    Ok(parts)
}
