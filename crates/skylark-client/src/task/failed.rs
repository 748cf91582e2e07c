use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    ChunkCallback, CompletionCallback, ResponseCallback, ResponseTask, StreamingTask, Task, TaskId,
    TaskState,
};
use crate::error::ApiError;
use crate::queue::CallbackQueue;
use crate::response::Response;

/// A task that failed before any network activity.
///
/// Each registration fires once, on its queue, with the construction error.
/// Nothing is sent and nothing is registered with a session.
#[derive(Debug)]
pub struct FailedTask {
    id: TaskId,
    error: ApiError,
    cancelled: AtomicBool,
}

impl FailedTask {
    pub fn new(error: impl Into<ApiError>) -> Self {
        Self {
            id: TaskId::next(),
            error: error.into(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn error(&self) -> &ApiError {
        &self.error
    }
}

impl Task for FailedTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn state(&self) -> TaskState {
        if self.cancelled.load(Ordering::Acquire) {
            TaskState::Cancelled
        } else {
            TaskState::Completed
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl<T: Send + 'static> ResponseTask<T> for FailedTask {
    fn on_response_boxed(&self, queue: CallbackQueue, callback: ResponseCallback<T>) {
        if self.is_cancelled() {
            return;
        }
        let error = self.error.clone();
        queue.dispatch(move || callback(Response::failure(error)));
    }
}

impl StreamingTask for FailedTask {
    fn on_chunk_boxed(&self, queue: CallbackQueue, mut callback: ChunkCallback<Bytes>) {
        if self.is_cancelled() {
            return;
        }
        let error = self.error.clone();
        queue.dispatch(move || callback(Response::failure(error)));
    }

    fn on_complete_boxed(&self, queue: CallbackQueue, callback: CompletionCallback) {
        if self.is_cancelled() {
            return;
        }
        let error = self.error.clone();
        queue.dispatch(move || callback(Some(error)));
    }
}
