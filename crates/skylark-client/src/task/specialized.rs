use std::sync::Arc;

use super::{ResponseCallback, ResponseTask, Task, TaskId, TaskState};
use crate::error::BoxError;
use crate::queue::CallbackQueue;

type Transform<S, T> = Arc<dyn Fn(S) -> Result<T, BoxError> + Send + Sync + 'static>;

/// A response task whose success value is mapped through a fallible
/// transform before delivery.
///
/// Failures pass through untouched. A transform error becomes
/// [`ApiError::Transform`](crate::ApiError::Transform). Identity, state and
/// cancellation are those of the wrapped task.
pub struct SpecializedTask<S, T> {
    inner: Box<dyn ResponseTask<S>>,
    transform: Transform<S, T>,
}

impl<S: Send + 'static, T: Send + 'static> SpecializedTask<S, T> {
    pub fn new<F>(inner: Box<dyn ResponseTask<S>>, transform: F) -> Self
    where
        F: Fn(S) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            inner,
            transform: Arc::new(transform),
        }
    }
}

impl<S, T> Task for SpecializedTask<S, T> {
    fn id(&self) -> TaskId {
        self.inner.id()
    }

    fn state(&self) -> TaskState {
        self.inner.state()
    }

    fn cancel(&self) {
        self.inner.cancel()
    }
}

impl<S: Send + 'static, T: Send + 'static> ResponseTask<T> for SpecializedTask<S, T> {
    fn on_response_boxed(&self, queue: CallbackQueue, callback: ResponseCallback<T>) {
        let transform = self.transform.clone();
        self.inner.on_response_boxed(
            queue,
            Box::new(move |response| callback(response.try_map(|value| transform(value)))),
        );
    }
}

impl<S, T> std::fmt::Debug for SpecializedTask<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecializedTask")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
