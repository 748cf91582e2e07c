//! Callback queues.
//!
//! Every caller-visible callback runs on a [`CallbackQueue`]: a named worker
//! thread draining a FIFO channel. Callbacks never run on transport threads,
//! and callbacks sent to one queue run one at a time in send order.

use once_cell::sync::Lazy;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

type Job = Box<dyn FnOnce() + Send + 'static>;

static MAIN: Lazy<CallbackQueue> = Lazy::new(|| CallbackQueue::new("skylark-main"));

/// A serial execution queue backed by one named thread.
///
/// Cloning shares the queue. The thread exits once every clone is dropped
/// and the backlog is drained.
#[derive(Clone)]
pub struct CallbackQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    label: String,
    thread_id: ThreadId,
    sender: crossbeam_channel::Sender<Job>,
}

impl CallbackQueue {
    /// Spawn a new queue with its own thread.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let thread_label = label.clone();
        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                        tracing::error!(queue = %thread_label, panic = %panic_message(panic.as_ref()), "callback panicked");
                    }
                }
            })
            .expect("failed to spawn callback queue thread");

        Self {
            inner: Arc::new(QueueInner {
                label,
                thread_id: handle.thread().id(),
                sender,
            }),
        }
    }

    /// The process-wide default queue.
    pub fn main() -> CallbackQueue {
        MAIN.clone()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the calling thread is this queue's worker.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Schedule `job` after everything already queued.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.sender.send(Box::new(job)).is_err() {
            tracing::warn!(queue = %self.inner.label, "callback queue is gone, dropping callback");
        }
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::main()
    }
}

impl std::fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackQueue").field("label", &self.inner.label).finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_order_on_the_queue_thread() {
        let queue = CallbackQueue::new("test-order");
        let (tx, rx) = mpsc::channel();
        for i in 0..100 {
            let tx = tx.clone();
            let q = queue.clone();
            queue.dispatch(move || tx.send((i, q.is_current())).unwrap());
        }
        let got: Vec<_> = (0..100).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        assert!(got.iter().all(|(_, on_queue)| *on_queue));
        assert_eq!(got.iter().map(|(i, _)| *i).collect::<Vec<_>>(), (0..100).collect::<Vec<_>>());
        assert!(!queue.is_current());
    }

    #[test]
    fn test_thread_is_named_after_label() {
        let queue = CallbackQueue::new("named-queue");
        let (tx, rx) = mpsc::channel();
        queue.dispatch(move || tx.send(thread::current().name().map(String::from)).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().as_deref(), Some("named-queue"));
        assert_eq!(queue.label(), "named-queue");
    }

    #[test]
    fn test_panicking_callback_does_not_kill_the_queue() {
        let queue = CallbackQueue::new("test-panic");
        let (tx, rx) = mpsc::channel();
        queue.dispatch(|| panic!("boom"));
        queue.dispatch(move || tx.send(42).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_main_queue_is_shared() {
        let a = CallbackQueue::main();
        let b = CallbackQueue::default();
        assert_eq!(a.label(), "skylark-main");
        let (tx, rx) = mpsc::channel();
        a.dispatch(move || tx.send(b.is_current()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}
