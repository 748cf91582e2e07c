//! Authorization strategies.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use skylark_common_secret::SecretString;
use url::Url;

use crate::entropy::{Clock, NonceSource};
use crate::oauth::{self, OAuth1Credentials};
use crate::request::HttpMethod;

/// How a session authorizes its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationMethod {
    /// OAuth 1.0a user context, HMAC-SHA1 signed per request.
    OAuth1(OAuth1Credentials),
    /// HTTP Basic with the API key pair, used for app-only token exchange.
    Basic {
        api_key: SecretString,
        api_secret_key: SecretString,
    },
    /// OAuth 2.0 bearer token.
    Bearer(SecretString),
}

impl AuthenticationMethod {
    pub fn oauth1(
        consumer_key: impl Into<SecretString>,
        consumer_secret: impl Into<SecretString>,
        token: impl Into<SecretString>,
        token_secret: impl Into<SecretString>,
    ) -> Self {
        AuthenticationMethod::OAuth1(OAuth1Credentials::new(consumer_key, consumer_secret, token, token_secret))
    }

    pub fn basic(api_key: impl Into<SecretString>, api_secret_key: impl Into<SecretString>) -> Self {
        AuthenticationMethod::Basic {
            api_key: api_key.into(),
            api_secret_key: api_secret_key.into(),
        }
    }

    pub fn bearer(token: impl Into<SecretString>) -> Self {
        AuthenticationMethod::Bearer(token.into())
    }

    /// Scheme word of the produced header.
    pub fn scheme(&self) -> &'static str {
        match self {
            AuthenticationMethod::OAuth1(_) => "OAuth",
            AuthenticationMethod::Basic { .. } => "Basic",
            AuthenticationMethod::Bearer(_) => "Bearer",
        }
    }

    /// `Authorization` header value for one request.
    ///
    /// `signed_params` only matter for OAuth 1.0a; the nonce and clock are
    /// consulted only there too.
    pub fn authorization_header(
        &self,
        method: HttpMethod,
        url: &Url,
        signed_params: &[(String, String)],
        clock: &dyn Clock,
        nonces: &dyn NonceSource,
    ) -> String {
        match self {
            AuthenticationMethod::OAuth1(credentials) => oauth::authorization_header(
                method,
                url,
                signed_params,
                credentials,
                &nonces.nonce(),
                clock.unix_timestamp(),
            ),
            AuthenticationMethod::Basic { api_key, api_secret_key } => {
                let credential = format!("{}:{}", api_key.expose_str(), api_secret_key.expose_str());
                format!("Basic {}", BASE64.encode(credential.as_bytes()))
            }
            AuthenticationMethod::Bearer(token) => format!("Bearer {}", token.expose_str()),
        }
    }
}
