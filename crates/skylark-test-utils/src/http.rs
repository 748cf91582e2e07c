//! HTTP mocking utilities using wiremock.

use serde::Serialize;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// HTTP mock server wrapper with convenience methods
pub struct TestHttpServer {
    server: MockServer,
}

impl TestHttpServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL, usable as an API environment base.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Register an endpoint answering `status` with a JSON body.
    pub async fn json<T: Serialize>(&self, verb: &str, endpoint: &str, status: u16, body: &T) {
        Mock::given(method(verb))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Register an endpoint answering `status` with raw bytes.
    pub async fn raw(&self, verb: &str, endpoint: &str, status: u16, body: impl Into<Vec<u8>>) {
        Mock::given(method(verb))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(body.into()))
            .mount(&self.server)
            .await;
    }

    /// Register an endpoint that answers after `latency`.
    pub async fn slow(&self, verb: &str, endpoint: &str, latency: Duration) {
        Mock::given(method(verb))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_delay(latency))
            .mount(&self.server)
            .await;
    }

    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// The single request received so far, panicking otherwise.
    pub async fn only_request(&self) -> Request {
        let mut received = self.received_requests().await;
        assert_eq!(received.len(), 1, "expected exactly one request, got {}", received.len());
        received.remove(0)
    }

    /// Verify that `endpoint` was hit `times` times.
    pub async fn verify_received(&self, endpoint: &str, times: usize) {
        let count = self
            .received_requests()
            .await
            .iter()
            .filter(|r| r.url.path() == endpoint)
            .count();
        assert_eq!(
            count, times,
            "Expected {} requests to {}, got {}",
            times, endpoint, count
        );
    }
}
