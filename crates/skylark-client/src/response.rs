//! Classified responses.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use url::Url;

use crate::error::{ApiError, BoxError};

/// Status line and headers of an HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseMeta {
    pub fn new(url: Url, status: u16, headers: HeaderMap) -> Self {
        Self { url, status, headers }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Header value as text, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Outcome of a task: a value or an error, with the HTTP metadata when a
/// response was received.
#[derive(Debug, Clone)]
pub enum Response<T> {
    Success { value: T, meta: ResponseMeta },
    Failure { error: ApiError, meta: Option<ResponseMeta> },
}

impl<T> Response<T> {
    pub fn failure(error: impl Into<ApiError>) -> Self {
        Response::Failure {
            error: error.into(),
            meta: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Response::Success { value, .. } => Some(value),
            Response::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Response::Success { .. } => None,
            Response::Failure { error, .. } => Some(error),
        }
    }

    pub fn meta(&self) -> Option<&ResponseMeta> {
        match self {
            Response::Success { meta, .. } => Some(meta),
            Response::Failure { meta, .. } => meta.as_ref(),
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            Response::Success { value, .. } => Ok(value),
            Response::Failure { error, .. } => Err(error),
        }
    }

    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Response::Success { value, meta } => Response::Success { value: f(value), meta },
            Response::Failure { error, meta } => Response::Failure { error, meta },
        }
    }

    /// Apply a fallible transform; a transform error becomes
    /// [`ApiError::Transform`] and keeps the metadata.
    pub fn try_map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> Result<U, BoxError>,
    {
        match self {
            Response::Success { value, meta } => match f(value) {
                Ok(value) => Response::Success { value, meta },
                Err(e) => Response::Failure {
                    error: ApiError::transform(e),
                    meta: Some(meta),
                },
            },
            Response::Failure { error, meta } => Response::Failure { error, meta },
        }
    }
}

/// Classify a received body by status: anything outside 200..=299 is an
/// [`ApiError::Http`] carrying the body, whatever the body contains.
pub fn classify(meta: ResponseMeta, body: Bytes) -> Response<Bytes> {
    if meta.is_success() {
        Response::Success { value: body, meta }
    } else {
        Response::Failure {
            error: ApiError::Http {
                status: meta.status,
                body,
            },
            meta: Some(meta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn meta(status: u16) -> ResponseMeta {
        ResponseMeta::new(Url::parse("https://api.example.com/x").unwrap(), status, HeaderMap::new())
    }

    #[test_case(200, true)]
    #[test_case(204, true)]
    #[test_case(299, true)]
    #[test_case(199, false)]
    #[test_case(300, false)]
    #[test_case(401, false)]
    #[test_case(503, false)]
    fn test_classification_by_status(status: u16, success: bool) {
        let response = classify(meta(status), Bytes::from_static(b"{\"ok\":true}"));
        assert_eq!(response.is_success(), success);
    }

    #[test]
    fn test_unauthorized_keeps_status_and_body() {
        let response = classify(meta(401), Bytes::from_static(b"{\"errors\":[{\"code\":89}]}"));
        let error = response.error().unwrap();
        assert_eq!(error.status(), Some(401));
        assert_eq!(error.body().unwrap().as_ref(), b"{\"errors\":[{\"code\":89}]}");
        assert_eq!(response.meta().unwrap().status, 401);
    }

    #[test]
    fn test_try_map_failure_becomes_transform_error() {
        let response = classify(meta(200), Bytes::from_static(b"nope"));
        let mapped: Response<u32> = response.try_map(|_| Err("not a number".into()));
        assert!(matches!(mapped.error(), Some(ApiError::Transform(_))));
        assert_eq!(mapped.meta().unwrap().status, 200);
    }

    #[test]
    fn test_map_passes_failures_through() {
        let response: Response<Bytes> = Response::failure(ApiError::Http {
            status: 500,
            body: Bytes::new(),
        });
        let mapped = response.map(|b| b.len());
        assert_eq!(mapped.into_result().unwrap_err().status(), Some(500));
    }
}
