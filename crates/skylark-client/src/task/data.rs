use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::AbortHandle;

use super::{Lifecycle, ReleaseHook, ResponseCallback, ResponseTask, Task, TaskId, TaskState};
use crate::queue::CallbackQueue;
use crate::response::Response;

/// A live request/response task.
///
/// Cloning yields another handle to the same task.
#[derive(Clone)]
pub struct DataTask {
    shared: Arc<Shared>,
}

struct Shared {
    lifecycle: Lifecycle,
    state: Mutex<State>,
}

struct State {
    phase: TaskState,
    outcome: Option<Response<Bytes>>,
    waiters: Vec<(CallbackQueue, ResponseCallback<Bytes>)>,
}

impl DataTask {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                lifecycle: Lifecycle::new(),
                state: Mutex::new(State {
                    phase: TaskState::Running,
                    outcome: None,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    pub(crate) fn attach_abort(&self, handle: AbortHandle) {
        self.shared.lifecycle.attach_abort(handle);
    }

    pub(crate) fn set_release(&self, hook: ReleaseHook) {
        self.shared.lifecycle.set_release(hook);
    }

    /// Record the outcome and schedule every waiting callback. Ignored once
    /// the task is terminal.
    pub(crate) fn complete(&self, response: Response<Bytes>) {
        let waiters = {
            let mut state = self.shared.state.lock();
            if state.phase != TaskState::Running {
                return;
            }
            state.phase = TaskState::Completed;
            state.outcome = Some(response.clone());
            std::mem::take(&mut state.waiters)
        };

        tracing::debug!(
            task = %self.id(),
            success = response.is_success(),
            callbacks = waiters.len(),
            "data task completed"
        );

        self.shared.lifecycle.release();
        for (queue, callback) in waiters {
            let response = response.clone();
            queue.dispatch(move || callback(response));
        }
    }
}

impl Task for DataTask {
    fn id(&self) -> TaskId {
        self.shared.lifecycle.id()
    }

    fn state(&self) -> TaskState {
        self.shared.state.lock().phase
    }

    fn cancel(&self) {
        let dropped = {
            let mut state = self.shared.state.lock();
            if state.phase != TaskState::Running {
                return;
            }
            state.phase = TaskState::Cancelled;
            std::mem::take(&mut state.waiters)
        };
        tracing::debug!(task = %self.id(), dropped = dropped.len(), "data task cancelled");
        drop(dropped);

        self.shared.lifecycle.abort();
        self.shared.lifecycle.release();
    }
}

impl ResponseTask<Bytes> for DataTask {
    fn on_response_boxed(&self, queue: CallbackQueue, callback: ResponseCallback<Bytes>) {
        let mut state = self.shared.state.lock();
        let phase = state.phase;
        match phase {
            TaskState::Running => state.waiters.push((queue, callback)),
            TaskState::Completed => {
                if let Some(response) = state.outcome.clone() {
                    drop(state);
                    queue.dispatch(move || callback(response));
                }
            }
            TaskState::Cancelled => {}
        }
    }
}

impl std::fmt::Debug for DataTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTask")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::response::ResponseMeta;
    use crate::task::ResponseTaskExt;
    use std::sync::mpsc;
    use std::time::Duration;

    fn ok_response(body: &'static str) -> Response<Bytes> {
        let meta = ResponseMeta::new(
            "https://api.example.com/1.1/x.json".parse().unwrap(),
            200,
            Default::default(),
        );
        Response::Success {
            value: Bytes::from_static(body.as_bytes()),
            meta,
        }
    }

    #[test]
    fn test_callback_registered_before_completion_fires_once() {
        let queue = CallbackQueue::new("data-before");
        let task = DataTask::new();
        let (tx, rx) = mpsc::channel();

        task.on_response(&queue, move |r| tx.send(r.into_result().unwrap()).unwrap());
        task.complete(ok_response("a"));
        task.complete(ok_response("b"));

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Bytes::from_static(b"a"));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn test_callback_registered_after_completion_gets_stored_outcome() {
        let queue = CallbackQueue::new("data-after");
        let task = DataTask::new();
        task.complete(Response::failure(ApiError::Http {
            status: 503,
            body: Bytes::new(),
        }));

        let (tx, rx) = mpsc::channel();
        task.on_response(&queue, move |r| tx.send(r.error().and_then(ApiError::status)).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Some(503));
    }

    #[test]
    fn test_cancel_drops_pending_callbacks_and_releases() {
        let queue = CallbackQueue::new("data-cancel");
        let task = DataTask::new();
        let (released_tx, released_rx) = mpsc::channel();
        task.set_release(Box::new(move |id| released_tx.send(id).unwrap()));

        let (tx, rx) = mpsc::channel::<()>();
        task.on_response(&queue, move |_| tx.send(()).unwrap());
        task.cancel();
        task.cancel();
        task.complete(ok_response("late"));

        assert_eq!(task.state(), TaskState::Cancelled);
        assert_eq!(released_rx.recv_timeout(Duration::from_secs(1)).unwrap(), task.id());
        // The sender lived inside the dropped callback.
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_cancel_after_completion_is_a_no_op() {
        let task = DataTask::new();
        task.complete(ok_response("done"));
        task.cancel();
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_response_future_resolves_and_cancel_yields_none() {
        let task = DataTask::new();
        let pending = task.response();
        task.complete(ok_response("x"));
        let response = pending.await.unwrap();
        assert!(response.is_success());

        let cancelled = DataTask::new();
        let pending = cancelled.response();
        cancelled.cancel();
        assert!(pending.await.is_none());
    }
}
