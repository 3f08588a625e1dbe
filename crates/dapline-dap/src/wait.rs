//! Waiting on a request with a cancellation token
//!
//! [`wait_cancellable`] is for async callers. [`block_on_cancellable`] is
//! for synchronous callers (a UI thread, a plugin host callback) that must
//! not block indefinitely: it polls the token every `poll_interval`, so a
//! cancel is observed within one interval.

use crate::{Error, Result};
use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Await `future` unless `token` fires first.
///
/// On cancellation the future is dropped; for a [`crate::ResultHandle`]
/// that deregisters the pending request.
pub async fn wait_cancellable<F, T>(future: F, token: &CancellationToken) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

/// Run `future` on `runtime` and block the calling thread until it
/// completes, `token` is cancelled, or the runtime drops the task.
///
/// Must not be called from a runtime worker thread: use
/// [`wait_cancellable`] there, or move the call into `spawn_blocking`.
pub fn block_on_cancellable<F, T>(
    runtime: &Handle,
    future: F,
    token: &CancellationToken,
    poll_interval: Duration,
) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let (tx, rx) = mpsc::channel();
    let task = runtime.spawn(async move {
        let _ = tx.send(future.await);
    });

    loop {
        match rx.recv_timeout(poll_interval) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => {
                if token.is_cancelled() {
                    debug!("Blocking wait cancelled");
                    // Dropping the future cancels the request it was awaiting
                    task.abort();
                    return Err(Error::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Interrupted(
                    "Task dropped before producing a result (runtime shutting down?)".to_string(),
                ));
            }
        }
    }
}
