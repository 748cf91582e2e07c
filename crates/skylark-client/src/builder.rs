//! Turning request descriptions into signed HTTP requests.

use bytes::Bytes;
use indexmap::IndexMap;
use reqwest::header::HeaderValue;
use skylark_common_secret::redact_authorization;
use std::sync::Arc;
use url::Url;

use crate::auth::AuthenticationMethod;
use crate::config::ApiEnvironment;
use crate::encoding::{self, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON};
use crate::entropy::{Clock, NonceSource, SystemClock, UuidNonce};
use crate::error::RequestError;
use crate::multipart;
use crate::request::{ApiRequest, BodyContentType, HttpMethod};

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";

/// A fully formed request, ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub url: Url,
    pub method: HttpMethod,
    /// Headers in the order they were set.
    pub headers: IndexMap<String, String>,
    pub body: Option<Bytes>,
}

impl BuiltRequest {
    /// Look up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Composes encoders and the authorization strategy.
#[derive(Clone)]
pub struct RequestBuilder {
    auth: AuthenticationMethod,
    environment: ApiEnvironment,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceSource>,
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("auth", &self.auth)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl RequestBuilder {
    pub fn new(auth: AuthenticationMethod, environment: ApiEnvironment) -> Self {
        Self {
            auth,
            environment,
            clock: Arc::new(SystemClock),
            nonces: Arc::new(UuidNonce),
        }
    }

    /// Replace the clock used for OAuth timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the token source used for OAuth nonces and multipart
    /// boundaries.
    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn auth(&self) -> &AuthenticationMethod {
        &self.auth
    }

    pub fn environment(&self) -> &ApiEnvironment {
        &self.environment
    }

    /// Build the signed request.
    pub fn build(&self, request: &dyn ApiRequest) -> Result<BuiltRequest, RequestError> {
        let method = request.method();
        let mut url = request.request_url(&self.environment)?;

        let signed = request.oauth_parameters().to_pairs()?;
        let authorization = self.auth.authorization_header(
            method,
            &url,
            &signed,
            self.clock.as_ref(),
            self.nonces.as_ref(),
        );

        let mut headers = IndexMap::new();
        insert_header(&mut headers, AUTHORIZATION, authorization)?;

        let query = request.query_parameters();
        if !query.is_empty() {
            url.set_query(Some(&encoding::query_string(&query)?));
        }

        let body_params = request.body_parameters();
        let body = if method.prefers_query_parameters() || body_params.is_empty() {
            None
        } else {
            let (content_type, bytes) = match request.body_content_type() {
                BodyContentType::UrlEncoded => (CONTENT_TYPE_FORM.to_string(), encoding::form_body(&body_params)?),
                BodyContentType::Json => (CONTENT_TYPE_JSON.to_string(), encoding::json_body(&body_params)?),
                BodyContentType::Multipart => {
                    let boundary = multipart::boundary_from_token(&self.nonces.nonce());
                    let bytes = multipart::encode_parameters(&body_params, &boundary)?;
                    (multipart::content_type(&boundary), bytes)
                }
            };
            insert_header(&mut headers, CONTENT_TYPE, content_type)?;
            if request.body_content_type() == BodyContentType::Multipart {
                insert_header(&mut headers, CONTENT_LENGTH, bytes.len().to_string())?;
            }
            Some(Bytes::from(bytes))
        };

        tracing::debug!(
            %method,
            %url,
            authorization = %headers.get(AUTHORIZATION).map(|v| redact_authorization(v)).unwrap_or_default(),
            body_len = body.as_ref().map(|b| b.len()).unwrap_or(0),
            "built request"
        );

        Ok(BuiltRequest {
            url,
            method,
            headers,
            body,
        })
    }
}

fn insert_header(headers: &mut IndexMap<String, String>, name: &str, value: String) -> Result<(), RequestError> {
    if HeaderValue::from_str(&value).is_err() {
        let shown = if name == AUTHORIZATION {
            redact_authorization(&value)
        } else {
            value
        };
        return Err(RequestError::CannotEncodeStringToData(format!("{name}: {shown}")));
    }
    headers.insert(name.to_string(), value);
    Ok(())
}
