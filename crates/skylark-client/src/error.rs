//! Error types for the Skylark client.
//!
//! Every failure a caller can observe is recovered into [`ApiError`] and
//! delivered through a task callback. The types are `Clone` so one classified
//! outcome can be handed to each registered callback.

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by response transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised while turning a request description into an HTTP request.
///
/// These never reach the network: the session hands them back as a failed
/// task.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The base URL and path did not form a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A string could not be turned into header or body bytes.
    #[error("cannot encode string to data: {0:?}")]
    CannotEncodeStringToData(String),

    /// A parameter value is not allowed in the position it was placed.
    #[error("invalid parameter `{parameter}`: {cause}")]
    InvalidParameter { parameter: String, cause: String },

    /// The parameter map could not be written as a JSON object.
    #[error("JSON serialization failed: {0}")]
    JsonSerializationFailed(#[source] Arc<serde_json::Error>),
}

impl RequestError {
    pub(crate) fn invalid_parameter(parameter: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            cause: cause.into(),
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        Self::JsonSerializationFailed(Arc::new(e))
    }
}

/// Connection-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP transport failed: {0}")]
    Http(#[source] Arc<reqwest::Error>),

    #[error("I/O failed: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error("transport is shut down")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(Arc::new(e))
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            TransportError::Timeout
        } else {
            TransportError::Io(Arc::new(e))
        }
    }
}

/// The failure half of a [`Response`](crate::Response).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request construction failed: {0}")]
    Request(#[from] RequestError),

    /// The server answered outside 200..=299.
    #[error("HTTP error: status {status}")]
    Http { status: u16, body: Bytes },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A `specialized` transform rejected an otherwise successful response.
    #[error("response transform failed: {0}")]
    Transform(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl ApiError {
    pub(crate) fn transform(e: BoxError) -> Self {
        ApiError::Transform(Arc::from(e))
    }

    /// HTTP status code, when the failure is an HTTP error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body, when the failure is an HTTP error.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            ApiError::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Construction error, when the request never reached the network.
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            ApiError::Request(e) => Some(e),
            _ => None,
        }
    }
}
