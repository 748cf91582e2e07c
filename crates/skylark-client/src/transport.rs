//! The network seam.
//!
//! A [`Session`](crate::Session) hands fully built requests to a
//! [`Transport`]. The default implementation is backed by reqwest; tests
//! substitute scripted transports.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

use crate::builder::BuiltRequest;
use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::response::ResponseMeta;

/// A buffered response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub meta: ResponseMeta,
    pub body: Bytes,
}

/// An open response whose body arrives incrementally.
pub struct TransportStream {
    pub meta: ResponseMeta,
    pub body: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl std::fmt::Debug for TransportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportStream").field("meta", &self.meta).finish()
    }
}

/// Executes built requests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send the request and buffer the whole body.
    async fn execute(&self, request: BuiltRequest) -> Result<TransportResponse, TransportError>;

    /// Send the request and return once the status line and headers arrive.
    async fn open_stream(&self, request: BuiltRequest) -> Result<TransportStream, TransportError>;
}

/// reqwest-backed transport.
///
/// Data requests use a client with the configured total timeout. Streams use
/// a second client with only the connect timeout, since they stay open.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    stream_client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &SessionConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(config, Some(config.request_timeout()))?,
            stream_client: build_client(config, None)?,
        })
    }

    fn prepare(client: &Client, request: BuiltRequest) -> reqwest::RequestBuilder {
        let mut builder = client.request(request.method.into(), request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

fn build_client(config: &SessionConfig, timeout: Option<Duration>) -> Result<Client, TransportError> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout())
        .user_agent(&config.user_agent)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if config.gzip {
        builder = builder.gzip(true);
    }

    builder.build().map_err(TransportError::from)
}

fn meta_of(response: &reqwest::Response) -> ResponseMeta {
    ResponseMeta::new(
        response.url().clone(),
        response.status().as_u16(),
        response.headers().clone(),
    )
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: BuiltRequest) -> Result<TransportResponse, TransportError> {
        let method = request.method;
        let url = request.url.clone();
        tracing::debug!(%method, %url, "sending request");

        let response = Self::prepare(&self.client, request).send().await?;
        let meta = meta_of(&response);
        let body = response.bytes().await?;

        tracing::debug!(%method, %url, status = meta.status, bytes = body.len(), "response received");
        Ok(TransportResponse { meta, body })
    }

    async fn open_stream(&self, request: BuiltRequest) -> Result<TransportStream, TransportError> {
        let url = request.url.clone();
        tracing::debug!(method = %request.method, %url, "opening stream");

        let response = Self::prepare(&self.stream_client, request).send().await?;
        let meta = meta_of(&response);
        tracing::debug!(%url, status = meta.status, "stream opened");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();
        Ok(TransportStream { meta, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuiltRequest;
    use crate::request::HttpMethod;
    use indexmap::IndexMap;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(server: &MockServer, method: HttpMethod, route: &str) -> BuiltRequest {
        BuiltRequest {
            url: format!("{}{}", server.uri(), route).parse().unwrap(),
            method,
            headers: IndexMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_execute_buffers_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("status=hi"))
            .respond_with(ResponseTemplate::new(403).set_body_string("{\"errors\":[]}"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&SessionConfig::default()).unwrap();
        let mut built = request(&server, HttpMethod::Post, "/1.1/statuses/update.json");
        built.headers.insert(
            "Content-Type".into(),
            "application/x-www-form-urlencoded".into(),
        );
        built.body = Some(Bytes::from_static(b"status=hi"));

        let response = transport.execute(built).await.unwrap();
        assert_eq!(response.meta.status, 403);
        assert_eq!(response.body, Bytes::from_static(b"{\"errors\":[]}"));
    }

    #[tokio::test]
    async fn test_open_stream_yields_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.1/statuses/sample.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"a\":1}\r\n{\"b\":2}\r\n"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&SessionConfig::default()).unwrap();
        let stream = transport
            .open_stream(request(&server, HttpMethod::Get, "/1.1/statuses/sample.json"))
            .await
            .unwrap();
        assert!(stream.meta.is_success());

        let chunks: Vec<Bytes> = stream.body.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), b"{\"a\":1}\r\n{\"b\":2}\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_transport_error() {
        let transport = ReqwestTransport::new(&SessionConfig::default()).unwrap();
        let built = BuiltRequest {
            url: "http://127.0.0.1:9/unreachable".parse().unwrap(),
            method: HttpMethod::Get,
            headers: IndexMap::new(),
            body: None,
        };
        assert!(transport.execute(built).await.is_err());
    }
}
