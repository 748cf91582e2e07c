//! Request descriptions.
//!
//! Endpoints are described by implementing [`ApiRequest`]; the session turns a
//! description into a signed [`BuiltRequest`](crate::BuiltRequest). For
//! one-off calls and tests, [`RequestDescription`] implements the trait with a
//! builder API.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::config::ApiEnvironment;
use crate::error::RequestError;
use crate::params::{ParamValue, Parameters};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// GET and DELETE carry their parameters in the query string.
    pub fn prefers_query_parameters(self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Encoding of the request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyContentType {
    #[default]
    UrlEncoded,
    Json,
    Multipart,
}

/// Which base URL of the environment a request is sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseUrlKind {
    #[default]
    Api,
    Upload,
}

/// Description of one API call.
///
/// Only `method`, `path` and `parameters` are required. The split of
/// parameters between query, body and OAuth signature follows the method and
/// body content type unless an endpoint overrides it.
pub trait ApiRequest: Send + Sync {
    fn method(&self) -> HttpMethod;

    /// Path appended to the base URL, starting with `/`.
    fn path(&self) -> String;

    fn parameters(&self) -> Parameters;

    fn base_url_kind(&self) -> BaseUrlKind {
        BaseUrlKind::Api
    }

    fn body_content_type(&self) -> BodyContentType {
        BodyContentType::UrlEncoded
    }

    /// Parameters sent in the query string.
    fn query_parameters(&self) -> Parameters {
        if self.method().prefers_query_parameters() {
            self.parameters()
        } else {
            Parameters::new()
        }
    }

    /// Parameters sent in the body.
    fn body_parameters(&self) -> Parameters {
        if self.method().prefers_query_parameters() {
            Parameters::new()
        } else {
            self.parameters()
        }
    }

    /// Parameters covered by an OAuth 1.0a signature. JSON and multipart
    /// bodies are not part of the signature base string; their query is.
    fn oauth_parameters(&self) -> Parameters {
        match self.body_content_type() {
            BodyContentType::UrlEncoded => self.parameters(),
            BodyContentType::Json | BodyContentType::Multipart => self.query_parameters(),
        }
    }

    /// Absolute URL, without query.
    fn request_url(&self, environment: &ApiEnvironment) -> Result<Url, RequestError> {
        let base = environment.base_url(self.base_url_kind());
        let raw = format!("{}{}", base.trim_end_matches('/'), self.path());
        let url = Url::parse(&raw).map_err(|e| RequestError::InvalidUrl(format!("{raw}: {e}")))?;
        // Query pairs must come from parameters.
        if url.query().is_some() || url.fragment().is_some() {
            return Err(RequestError::InvalidUrl(format!("{raw}: query or fragment in path")));
        }
        Ok(url)
    }
}

/// A request description assembled at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescription {
    method: HttpMethod,
    path: String,
    base_url_kind: BaseUrlKind,
    parameters: Parameters,
    extra_query: Parameters,
    body_content_type: BodyContentType,
}

impl RequestDescription {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            base_url_kind: BaseUrlKind::Api,
            parameters: Parameters::new(),
            extra_query: Parameters::new(),
            body_content_type: BodyContentType::UrlEncoded,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add a query parameter regardless of method, e.g. alongside a JSON body.
    /// Query-only parameters are never part of the body or the signature set
    /// of a JSON or multipart request.
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.extra_query.insert(key, value);
        self
    }

    pub fn content_type(mut self, content_type: BodyContentType) -> Self {
        self.body_content_type = content_type;
        self
    }

    pub fn base_url(mut self, kind: BaseUrlKind) -> Self {
        self.base_url_kind = kind;
        self
    }
}

impl ApiRequest for RequestDescription {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn parameters(&self) -> Parameters {
        self.parameters.clone()
    }

    fn base_url_kind(&self) -> BaseUrlKind {
        self.base_url_kind
    }

    fn body_content_type(&self) -> BodyContentType {
        self.body_content_type
    }

    fn query_parameters(&self) -> Parameters {
        let mut query = self.extra_query.clone();
        if self.method.prefers_query_parameters() {
            query.extend_from(&self.parameters);
        }
        query
    }

    fn oauth_parameters(&self) -> Parameters {
        match self.body_content_type {
            BodyContentType::UrlEncoded => {
                let mut signed = self.query_parameters();
                signed.extend_from(&self.body_parameters());
                signed
            }
            BodyContentType::Json | BodyContentType::Multipart => self.query_parameters(),
        }
    }
}
