//! OAuth 1.0a request signing (HMAC-SHA1).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use skylark_common_secret::SecretString;
use url::Url;

use crate::encoding::percent_encode;
use crate::request::HttpMethod;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// Consumer and (optional) access-token credentials.
///
/// Without a token the request is signed with the consumer alone, as the
/// request-token step of the three-legged flow requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth1Credentials {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub token: Option<SecretString>,
    pub token_secret: Option<SecretString>,
}

impl OAuth1Credentials {
    pub fn new(
        consumer_key: impl Into<SecretString>,
        consumer_secret: impl Into<SecretString>,
        token: impl Into<SecretString>,
        token_secret: impl Into<SecretString>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: Some(token.into()),
            token_secret: Some(token_secret.into()),
        }
    }

    pub fn consumer_only(consumer_key: impl Into<SecretString>, consumer_secret: impl Into<SecretString>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
            token_secret: None,
        }
    }
}

/// The `oauth_*` protocol parameters of one signature, before signing.
fn protocol_params(credentials: &OAuth1Credentials, nonce: &str, timestamp: i64) -> Vec<(String, String)> {
    let mut params = vec![
        ("oauth_consumer_key".to_string(), credentials.consumer_key.expose_str().to_string()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        ("oauth_signature_method".to_string(), SIGNATURE_METHOD.to_string()),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
    ];
    if let Some(token) = &credentials.token {
        params.push(("oauth_token".to_string(), token.expose_str().to_string()));
    }
    params.push(("oauth_version".to_string(), OAUTH_VERSION.to_string()));
    params
}

/// Scheme, authority and path of `url`; query and fragment dropped.
pub fn base_url(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.to_string()
}

/// `METHOD&encoded(base url)&encoded(sorted parameter string)`.
pub fn signature_base_string(method: HttpMethod, url: &Url, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.as_str(),
        percent_encode(&base_url(url)),
        percent_encode(&param_string)
    )
}

/// `encoded(consumer secret)&encoded(token secret)`.
pub fn signing_key(credentials: &OAuth1Credentials) -> String {
    let token_secret = credentials
        .token_secret
        .as_ref()
        .map(|s| s.expose_str())
        .unwrap_or("");
    format!(
        "{}&{}",
        percent_encode(credentials.consumer_secret.expose_str()),
        percent_encode(token_secret)
    )
}

/// Base64 HMAC-SHA1 of `base_string` under `key`.
pub fn sign(base_string: &str, key: &str) -> String {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base_string.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Full `Authorization` header value for one request.
///
/// `params` are the request parameters eligible for signing; the caller
/// decides eligibility. `nonce` and `timestamp` are taken as given so the
/// output is reproducible.
pub fn authorization_header(
    method: HttpMethod,
    url: &Url,
    params: &[(String, String)],
    credentials: &OAuth1Credentials,
    nonce: &str,
    timestamp: i64,
) -> String {
    let mut oauth_params = protocol_params(credentials, nonce, timestamp);

    let mut signed = oauth_params.clone();
    signed.extend(params.iter().cloned());
    let base_string = signature_base_string(method, url, &signed);
    let signature = sign(&base_string, &signing_key(credentials));
    tracing::trace!(%method, url = %base_url(url), "computed OAuth signature");

    oauth_params.push(("oauth_signature".to_string(), signature));
    oauth_params.sort();

    let fields = oauth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}
