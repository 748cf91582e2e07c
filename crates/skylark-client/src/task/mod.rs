//! Task handles.
//!
//! A task is the caller's handle on one submitted request. Data tasks
//! deliver exactly one [`Response`]; streaming tasks deliver one response per
//! received line. Callbacks are always scheduled on the [`CallbackQueue`]
//! given at registration, and a cancelled task schedules nothing further.

mod data;
mod failed;
mod specialized;
mod stream;

pub use data::DataTask;
pub use failed::FailedTask;
pub use specialized::SpecializedTask;
pub use stream::{StreamTask, MAX_PENDING_CHUNKS};

pub(crate) use stream::LineFramer;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::{ApiError, BoxError};
use crate::queue::CallbackQueue;
use crate::response::Response;

/// One-shot response callback.
pub type ResponseCallback<T> = Box<dyn FnOnce(Response<T>) + Send + 'static>;
/// Per-chunk callback of a streaming task.
pub type ChunkCallback<T> = Box<dyn FnMut(Response<T>) + Send + 'static>;
/// Terminal callback of a streaming task; `None` means a clean close.
pub type CompletionCallback = Box<dyn FnOnce(Option<ApiError>) + Send + 'static>;

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle phase of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Cancelled,
}

/// Operations shared by every task kind.
pub trait Task: Send + Sync {
    fn id(&self) -> TaskId;

    fn state(&self) -> TaskState;

    /// Stop the transfer and drop every registered callback that has not
    /// been scheduled yet. Idempotent.
    fn cancel(&self);

    fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }
}

/// A task that produces a single `Response<T>`.
///
/// Registering after completion still fires, with the stored outcome.
pub trait ResponseTask<T>: Task {
    fn on_response_boxed(&self, queue: CallbackQueue, callback: ResponseCallback<T>);
}

/// A task that produces a sequence of chunk responses.
pub trait StreamingTask: Task {
    /// Register a chunk callback. Chunks received before the first
    /// registration are buffered and replayed to it in order, up to
    /// [`MAX_PENDING_CHUNKS`]; beyond that the oldest are discarded.
    fn on_chunk_boxed(&self, queue: CallbackQueue, callback: ChunkCallback<Bytes>);

    fn on_complete_boxed(&self, queue: CallbackQueue, callback: CompletionCallback);
}

impl<T, R: ResponseTask<T> + ?Sized> ResponseTask<T> for Box<R> {
    fn on_response_boxed(&self, queue: CallbackQueue, callback: ResponseCallback<T>) {
        (**self).on_response_boxed(queue, callback)
    }
}

impl<R: Task + ?Sized> Task for Box<R> {
    fn id(&self) -> TaskId {
        (**self).id()
    }

    fn state(&self) -> TaskState {
        (**self).state()
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}

impl<R: StreamingTask + ?Sized> StreamingTask for Box<R> {
    fn on_chunk_boxed(&self, queue: CallbackQueue, callback: ChunkCallback<Bytes>) {
        (**self).on_chunk_boxed(queue, callback)
    }

    fn on_complete_boxed(&self, queue: CallbackQueue, callback: CompletionCallback) {
        (**self).on_complete_boxed(queue, callback)
    }
}

/// Ergonomic registration and transformation for response tasks.
pub trait ResponseTaskExt<T: Send + 'static>: ResponseTask<T> {
    /// Register `callback` on `queue`. Returns `self` so registrations chain.
    fn on_response<F>(&self, queue: &CallbackQueue, callback: F) -> &Self
    where
        F: FnOnce(Response<T>) + Send + 'static,
    {
        self.on_response_boxed(queue.clone(), Box::new(callback));
        self
    }

    /// Wrap this task so callbacks receive `transform(value)`.
    ///
    /// The transform runs on the callback queue at delivery. Cancelling the
    /// wrapper cancels this task.
    fn specialized<U, F>(self, transform: F) -> SpecializedTask<T, U>
    where
        Self: Sized + 'static,
        U: Send + 'static,
        F: Fn(T) -> Result<U, BoxError> + Send + Sync + 'static,
    {
        SpecializedTask::new(Box::new(self), transform)
    }

    /// Await the response. Resolves to `None` if the task is cancelled
    /// before it completes.
    fn response(&self) -> ResponseFuture<T> {
        let (sender, receiver) = oneshot::channel();
        self.on_response_boxed(
            CallbackQueue::main(),
            Box::new(move |response| {
                let _ = sender.send(response);
            }),
        );
        ResponseFuture { receiver }
    }
}

impl<T: Send + 'static, R: ResponseTask<T> + ?Sized> ResponseTaskExt<T> for R {}

/// Conveniences for tasks that produce raw bodies.
pub trait DataTaskExt: ResponseTask<Bytes> {
    /// Parse the body as JSON on delivery.
    fn on_response_json<F>(&self, queue: &CallbackQueue, callback: F) -> &Self
    where
        F: FnOnce(Response<serde_json::Value>) + Send + 'static,
    {
        self.on_response_boxed(
            queue.clone(),
            Box::new(move |response| callback(response.try_map(decode_json))),
        );
        self
    }

    /// Decode the body into `D` with serde_json.
    fn decodable<D>(self) -> SpecializedTask<Bytes, D>
    where
        Self: Sized + 'static,
        D: DeserializeOwned + Send + 'static,
    {
        SpecializedTask::new(Box::new(self), decode_json::<D>)
    }
}

impl<R: ResponseTask<Bytes> + ?Sized> DataTaskExt for R {}

/// Registration helpers for streaming tasks.
pub trait StreamingTaskExt: StreamingTask {
    fn on_chunk<F>(&self, queue: &CallbackQueue, callback: F) -> &Self
    where
        F: FnMut(Response<Bytes>) + Send + 'static,
    {
        self.on_chunk_boxed(queue.clone(), Box::new(callback));
        self
    }

    fn on_complete<F>(&self, queue: &CallbackQueue, callback: F) -> &Self
    where
        F: FnOnce(Option<ApiError>) + Send + 'static,
    {
        self.on_complete_boxed(queue.clone(), Box::new(callback));
        self
    }
}

impl<R: StreamingTask + ?Sized> StreamingTaskExt for R {}

fn decode_json<D: DeserializeOwned>(body: Bytes) -> Result<D, BoxError> {
    serde_json::from_slice(&body).map_err(|e| Box::new(e) as BoxError)
}

/// Future returned by [`ResponseTaskExt::response`].
#[must_use = "futures do nothing unless awaited"]
pub struct ResponseFuture<T> {
    receiver: oneshot::Receiver<Response<T>>,
}

impl<T> Future for ResponseFuture<T> {
    type Output = Option<Response<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(Result::ok)
    }
}

pub(crate) type ReleaseHook = Box<dyn FnOnce(TaskId) + Send + 'static>;

/// Bookkeeping shared by live tasks: the transfer to abort on cancel and the
/// hook that removes the task from its session once it is terminal.
pub(crate) struct Lifecycle {
    id: TaskId,
    abort: Mutex<Option<AbortHandle>>,
    release: Mutex<Option<ReleaseHook>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            id: TaskId::next(),
            abort: Mutex::new(None),
            release: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn attach_abort(&self, handle: AbortHandle) {
        *self.abort.lock() = Some(handle);
    }

    pub(crate) fn set_release(&self, hook: ReleaseHook) {
        *self.release.lock() = Some(hook);
    }

    pub(crate) fn abort(&self) {
        if let Some(handle) = self.abort.lock().take() {
            handle.abort();
        }
    }

    pub(crate) fn release(&self) {
        let hook = self.release.lock().take();
        if let Some(hook) = hook {
            hook(self.id);
        }
    }
}
