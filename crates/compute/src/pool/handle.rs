use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ComputeError;

/// Result slot for one submitted task.
///
/// Resolves once a worker has run the task. Await it from async code, or
/// call [`TaskHandle::wait`] from a plain thread.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, ComputeError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, ComputeError>>) -> Self {
        Self { rx }
    }

    /// Block the current thread until the task finishes.
    ///
    /// Must not be called from inside an async runtime; await the handle there.
    pub fn wait(self) -> Result<T, ComputeError> {
        self.rx
            .blocking_recv()
            .map_err(|_| ComputeError::Disconnected)
            .and_then(|result| result)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, ComputeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| {
                received
                    .map_err(|_| ComputeError::Disconnected)
                    .and_then(|result| result)
            })
    }
}
