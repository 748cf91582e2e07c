//! Test utilities for Skylark crates.

pub mod http;
pub mod multipart;

pub use http::TestHttpServer;
pub use multipart::{parse_multipart, ParsedPart};

use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// How long collectors wait for a callback before giving up.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-writer tracing subscriber once per test binary.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = skylark_common_log::init(skylark_common_log::LogConfig::for_tests());
    });
}

/// Creates a temporary file with given content.
pub fn temp_file(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test_file");
    std::fs::write(&path, content).expect("Failed to write temp file");
    (dir, path)
}

/// Gathers values produced on callback threads so an async test can await
/// them in order.
pub struct Collector<T> {
    sender: mpsc::UnboundedSender<T>,
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T: Send + 'static> Collector<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    /// A sink for use inside a callback.
    pub fn sink(&self) -> impl Fn(T) + Send + Sync + Clone + 'static {
        let sender = self.sender.clone();
        move |value| {
            let _ = sender.send(value);
        }
    }

    /// Next value, or `None` after [`CALLBACK_TIMEOUT`].
    pub async fn next(&mut self) -> Option<T> {
        self.next_within(CALLBACK_TIMEOUT).await
    }

    pub async fn next_within(&mut self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Exactly `count` values, panicking if any is late.
    pub async fn take(&mut self, count: usize) -> Vec<T> {
        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            match self.next().await {
                Some(value) => values.push(value),
                None => panic!("timed out waiting for callback {} of {}", i + 1, count),
            }
        }
        values
    }

    /// Assert nothing further arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if self.next_within(window).await.is_some() {
            panic!("unexpected extra callback");
        }
    }
}

impl<T: Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}
