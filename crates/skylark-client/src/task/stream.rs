use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::AbortHandle;

use super::{
    ChunkCallback, CompletionCallback, Lifecycle, ReleaseHook, StreamingTask, Task, TaskId,
    TaskState,
};
use crate::error::ApiError;
use crate::queue::CallbackQueue;
use crate::response::Response;

/// Splits a byte stream into newline-delimited messages.
///
/// A trailing `\r` is stripped, empty keep-alive lines are skipped and a
/// partial line is held until its newline arrives.
#[derive(Debug, Default)]
pub(crate) struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(Bytes::from(line));
            }
        }
        lines
    }

    /// Remaining bytes after the connection closed without a final newline.
    pub(crate) fn finish(self) -> Option<Bytes> {
        let mut rest = self.buffer;
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        (!rest.is_empty()).then(|| Bytes::from(rest))
    }
}

type SharedChunkCallback = Arc<Mutex<ChunkCallback<Bytes>>>;

fn invoke(sink: &SharedChunkCallback, chunk: Response<Bytes>) {
    let mut callback = sink.lock();
    (*callback)(chunk);
}

/// A live streaming task.
///
/// Chunks held for a stream with no chunk callback yet. Older chunks are
/// discarded first once the buffer is full.
pub const MAX_PENDING_CHUNKS: usize = 1024;

/// Cloning yields another handle to the same task.
#[derive(Clone)]
pub struct StreamTask {
    shared: Arc<Shared>,
}

struct Shared {
    lifecycle: Lifecycle,
    state: Mutex<State>,
}

struct State {
    phase: TaskState,
    pending: VecDeque<Response<Bytes>>,
    discarded: usize,
    sinks: Vec<(CallbackQueue, SharedChunkCallback)>,
    outcome: Option<Option<ApiError>>,
    completion_waiters: Vec<(CallbackQueue, CompletionCallback)>,
}

impl StreamTask {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                lifecycle: Lifecycle::new(),
                state: Mutex::new(State {
                    phase: TaskState::Running,
                    pending: VecDeque::new(),
                    discarded: 0,
                    sinks: Vec::new(),
                    outcome: None,
                    completion_waiters: Vec::new(),
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

    /// Hand one chunk to every chunk callback, or buffer it while none is
    /// registered.
    pub(crate) fn deliver(&self, chunk: Response<Bytes>) {
        let mut state = self.shared.state.lock();
        if state.phase != TaskState::Running {
            return;
        }
        if state.sinks.is_empty() {
            if state.pending.len() == MAX_PENDING_CHUNKS {
                state.pending.pop_front();
                state.discarded += 1;
                if state.discarded == 1 {
                    tracing::warn!(
                        task = %self.shared.lifecycle.id(),
                        limit = MAX_PENDING_CHUNKS,
                        "no chunk callback registered, discarding oldest buffered chunks"
                    );
                }
            }
            state.pending.push_back(chunk);
            return;
        }
        // Dispatching under the lock keeps chunk order across sinks.
        for (queue, sink) in &state.sinks {
            let sink = sink.clone();
            let chunk = chunk.clone();
            queue.dispatch(move || invoke(&sink, chunk));
        }
    }

    /// Mark the stream terminal and schedule completion callbacks.
    pub(crate) fn finish(&self, error: Option<ApiError>) {
        let waiters = {
            let mut state = self.shared.state.lock();
            if state.phase != TaskState::Running {
                return;
            }
            state.phase = TaskState::Completed;
            state.outcome = Some(error.clone());
            state.sinks.clear();
            std::mem::take(&mut state.completion_waiters)
        };

        match &error {
            None => tracing::debug!(task = %self.id(), "stream closed"),
            Some(e) => tracing::debug!(task = %self.id(), error = %e, "stream failed"),
        }

        self.shared.lifecycle.release();
        for (queue, callback) in waiters {
            let error = error.clone();
            queue.dispatch(move || callback(error));
        }
    }
}

impl Task for StreamTask {
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
            state.pending.clear();
            (
                std::mem::take(&mut state.sinks),
                std::mem::take(&mut state.completion_waiters),
            )
        };
        tracing::debug!(task = %self.id(), "stream task cancelled");
        drop(dropped);

        self.shared.lifecycle.abort();
        self.shared.lifecycle.release();
    }
}

impl StreamingTask for StreamTask {
    fn on_chunk_boxed(&self, queue: CallbackQueue, callback: ChunkCallback<Bytes>) {
        let mut state = self.shared.state.lock();
        if state.phase == TaskState::Cancelled {
            return;
        }

        let sink: SharedChunkCallback = Arc::new(Mutex::new(callback));
        for chunk in std::mem::take(&mut state.pending) {
            let sink = sink.clone();
            queue.dispatch(move || invoke(&sink, chunk));
        }
        // Nothing else can arrive for a completed stream.
        if state.phase == TaskState::Running {
            state.sinks.push((queue, sink));
        }
    }

    fn on_complete_boxed(&self, queue: CallbackQueue, callback: CompletionCallback) {
        let mut state = self.shared.state.lock();
        let phase = state.phase;
        match phase {
            TaskState::Running => state.completion_waiters.push((queue, callback)),
            TaskState::Completed => {
                let outcome = state.outcome.clone().flatten();
                drop(state);
                queue.dispatch(move || callback(outcome));
            }
            TaskState::Cancelled => {}
        }
    }
}

impl std::fmt::Debug for StreamTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTask")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
