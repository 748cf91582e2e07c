//! Sessions: submit requests and own every in-flight task.

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::auth::AuthenticationMethod;
use crate::builder::{BuiltRequest, RequestBuilder};
use crate::config::{ApiEnvironment, ConfigError, SessionConfig};
use crate::entropy::{Clock, NonceSource};
use crate::error::{ApiError, RequestError, TransportError};
use crate::request::ApiRequest;
use crate::response::{classify, Response};
use crate::task::{
    DataTask, FailedTask, LineFramer, ResponseTask, StreamTask, StreamingTask, Task, TaskId,
};
use crate::transport::{ReqwestTransport, Transport, TransportStream};

/// Failures constructing a [`Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to start transport runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// In-flight tasks by id. Entries leave on completion, failure or cancel.
#[derive(Default)]
struct Registry {
    tasks: Mutex<HashMap<TaskId, Box<dyn Task>>>,
}

impl Registry {
    fn insert(&self, task: Box<dyn Task>) {
        self.tasks.lock().insert(task.id(), task);
    }

    fn remove(&self, id: TaskId) {
        if self.tasks.lock().remove(&id).is_some() {
            tracing::debug!(task = %id, "task left registry");
        }
    }

    fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    fn drain(&self) -> Vec<Box<dyn Task>> {
        self.tasks.lock().drain().map(|(_, task)| task).collect()
    }
}

fn release_into(registry: &Arc<Registry>) -> Box<dyn FnOnce(TaskId) + Send + 'static> {
    let registry: Weak<Registry> = Arc::downgrade(registry);
    Box::new(move |id| {
        if let Some(registry) = registry.upgrade() {
            registry.remove(id);
        }
    })
}

/// Configures and builds a [`Session`].
pub struct SessionBuilder {
    auth: AuthenticationMethod,
    environment: ApiEnvironment,
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    nonces: Option<Arc<dyn NonceSource>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of the reqwest-backed one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = Some(nonces);
        self
    }

    pub fn build(self) -> Result<Session, SessionError> {
        self.config.validate()?;
        self.environment.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        let runtime = build_runtime(&self.config).map_err(SessionError::Runtime)?;

        let mut builder = RequestBuilder::new(self.auth, self.environment);
        if let Some(clock) = self.clock {
            builder = builder.with_clock(clock);
        }
        if let Some(nonces) = self.nonces {
            builder = builder.with_nonce_source(nonces);
        }

        tracing::debug!(
            auth = builder.auth().scheme(),
            api_base_url = %builder.environment().api_base_url,
            "session started"
        );

        Ok(Session {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            builder,
            transport,
            registry: Arc::new(Registry::default()),
        })
    }
}

fn build_runtime(config: &SessionConfig) -> std::io::Result<Runtime> {
    let mut builder = Builder::new_multi_thread();

    if config.worker_threads > 0 {
        builder.worker_threads(config.worker_threads);
    }

    builder.thread_name(&config.thread_name).enable_all().build()
}

/// Builds requests, hands them to the transport and tracks every in-flight
/// task until it completes or is cancelled.
///
/// The session runs transfers on its own runtime, so it can be used from
/// synchronous code and from inside another runtime alike. Dropping the
/// session cancels whatever is still in flight.
pub struct Session {
    builder: RequestBuilder,
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl Session {
    /// Session with the reqwest transport, system clock and random nonces.
    pub fn new(
        config: SessionConfig,
        auth: AuthenticationMethod,
        environment: ApiEnvironment,
    ) -> Result<Self, SessionError> {
        Self::builder(auth, environment).config(config).build()
    }

    pub fn builder(auth: AuthenticationMethod, environment: ApiEnvironment) -> SessionBuilder {
        SessionBuilder {
            auth,
            environment,
            config: SessionConfig::default(),
            transport: None,
            clock: None,
            nonces: None,
        }
    }

    pub fn request_builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Build and sign `request` without sending it.
    pub fn build_request(&self, request: &dyn ApiRequest) -> Result<BuiltRequest, RequestError> {
        self.builder.build(request)
    }

    /// Number of tasks that have neither finished nor been cancelled.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Submit a request whose response is buffered and delivered once.
    ///
    /// A request that cannot be built never reaches the network: the
    /// returned task fires every callback with the construction error.
    pub fn send(&self, request: &dyn ApiRequest) -> Box<dyn ResponseTask<Bytes>> {
        let built = match self.builder.build(request) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!(path = %request.path(), error = %e, "request could not be built");
                return Box::new(FailedTask::new(e));
            }
        };

        let task = DataTask::new();
        task.set_release(release_into(&self.registry));
        self.registry.insert(Box::new(task.clone()));

        let transport = self.transport.clone();
        let worker = task.clone();
        let join = self.handle.spawn(async move {
            let response = match transport.execute(built).await {
                Ok(received) => classify(received.meta, received.body),
                Err(e) => {
                    tracing::warn!(task = %worker.id(), error = %e, "transport failed");
                    Response::failure(e)
                }
            };
            worker.complete(response);
        });
        task.attach_abort(join.abort_handle());

        Box::new(task)
    }

    /// Submit a request whose response is delivered line by line for as
    /// long as the connection stays open.
    pub fn send_stream(&self, request: &dyn ApiRequest) -> Box<dyn StreamingTask> {
        let built = match self.builder.build(request) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!(path = %request.path(), error = %e, "stream request could not be built");
                return Box::new(FailedTask::new(e));
            }
        };

        let task = StreamTask::new();
        task.set_release(release_into(&self.registry));
        self.registry.insert(Box::new(task.clone()));

        let transport = self.transport.clone();
        let worker = task.clone();
        let join = self.handle.spawn(async move {
            match transport.open_stream(built).await {
                Ok(stream) => pump(&worker, stream).await,
                Err(e) => {
                    tracing::warn!(task = %worker.id(), error = %e, "stream failed to open");
                    let error = ApiError::from(e);
                    worker.deliver(Response::failure(error.clone()));
                    worker.finish(Some(error));
                }
            }
        });
        task.attach_abort(join.abort_handle());

        Box::new(task)
    }

    /// Cancel every in-flight task and stop the transport runtime.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let tasks = self.registry.drain();
        if !tasks.is_empty() {
            tracing::debug!(tasks = tasks.len(), "cancelling in-flight tasks");
        }
        for task in tasks {
            task.cancel();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("builder", &self.builder)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Drive an open stream to its end.
///
/// On a success status the body is framed into lines, one chunk per line.
/// Otherwise each received piece of body is delivered as an HTTP failure,
/// and the stream completes with the whole error body.
async fn pump(task: &StreamTask, stream: TransportStream) {
    let TransportStream { meta, mut body } = stream;
    let success = meta.is_success();
    let mut framer = LineFramer::default();
    let mut error_body = Vec::new();
    let mut delivered = false;

    while let Some(next) = body.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(task = %task.id(), error = %e, "stream interrupted");
                let error = ApiError::from(e);
                task.deliver(Response::Failure {
                    error: error.clone(),
                    meta: Some(meta.clone()),
                });
                task.finish(Some(error));
                return;
            }
        };

        if success {
            for line in framer.push(&bytes) {
                tracing::trace!(task = %task.id(), bytes = line.len(), "chunk received");
                task.deliver(Response::Success {
                    value: line,
                    meta: meta.clone(),
                });
            }
        } else if !bytes.is_empty() {
            error_body.extend_from_slice(&bytes);
            delivered = true;
            task.deliver(classify(meta.clone(), bytes));
        }

        if task.is_cancelled() {
            return;
        }
    }

    if success {
        if let Some(rest) = framer.finish() {
            task.deliver(Response::Success {
                value: rest,
                meta: meta.clone(),
            });
        }
        task.finish(None);
    } else {
        if !delivered {
            task.deliver(classify(meta.clone(), Bytes::new()));
        }
        task.finish(Some(ApiError::Http {
            status: meta.status,
            body: Bytes::from(error_body),
        }));
    }
}
