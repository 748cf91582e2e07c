//! Skylark: an HTTP client core for a social-media REST and streaming API.
//!
//! Describe an endpoint with [`ApiRequest`] (or [`RequestDescription`]),
//! hand it to a [`Session`] and register callbacks on the returned task.
//!
//! ```no_run
//! use skylark_client::{
//!     params, ApiEnvironment, AuthenticationMethod, CallbackQueue, DataTaskExt,
//!     RequestDescription, Session, SessionConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(
//!     SessionConfig::default(),
//!     AuthenticationMethod::bearer("token"),
//!     ApiEnvironment::new("https://api.example.com", "https://upload.example.com"),
//! )?;
//!
//! let request = RequestDescription::get("/1.1/search/tweets.json")
//!     .parameters(params! { "q" => "rust", "count" => 10 });
//!
//! session
//!     .send(&request)
//!     .on_response_json(&CallbackQueue::main(), |response| match response.into_result() {
//!         Ok(json) => println!("{json}"),
//!         Err(e) => eprintln!("request failed: {e}"),
//!     });
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod builder;
pub mod config;
pub mod encoding;
pub mod entropy;
pub mod error;
pub mod multipart;
pub mod oauth;
pub mod params;
pub mod queue;
pub mod request;
pub mod response;
pub mod session;
pub mod task;
pub mod transport;

pub use auth::AuthenticationMethod;
pub use builder::{BuiltRequest, RequestBuilder};
pub use config::{ApiEnvironment, ConfigError, SessionConfig};
pub use entropy::{Clock, FixedClock, FixedNonce, NonceSource, SystemClock, UuidNonce};
pub use error::{ApiError, BoxError, RequestError, TransportError};
pub use multipart::MultipartPart;
pub use oauth::OAuth1Credentials;
pub use params::{ParamValue, Parameters};
pub use queue::CallbackQueue;
pub use request::{ApiRequest, BaseUrlKind, BodyContentType, HttpMethod, RequestDescription};
pub use response::{Response, ResponseMeta};
pub use session::{Session, SessionBuilder, SessionError};
pub use task::{
    DataTask, DataTaskExt, FailedTask, ResponseFuture, ResponseTask, ResponseTaskExt,
    SpecializedTask, StreamTask, StreamingTask, StreamingTaskExt, Task, TaskId, TaskState,
    MAX_PENDING_CHUNKS,
};
pub use transport::{ReqwestTransport, Transport, TransportResponse, TransportStream};
