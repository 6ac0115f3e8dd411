//! Instance-owned, cancellable background tasks.
//!
//! Every timer the connection manager arms (reconnect backoff, connect timeout) and every
//! heartbeat task is tied to a [`TaskGuard`]. Dropping the guard cancels the task, so replacing
//! or clearing the `Option` holding it is the cancellation primitive.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancels the associated task when dropped.
#[derive(Debug)]
pub(crate) struct TaskGuard(DropGuard);

impl TaskGuard {
    /// Spawn `future` on `runtime`, racing it against the returned guard's cancellation.
    pub(crate) fn spawn<F>(runtime: &Handle, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        runtime.spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = future => {}
            }
        });

        Self(token.drop_guard())
    }
}

/// One-shot timer: run `on_fire` after `delay` unless the guard is dropped first.
///
/// Used for both the reconnect backoff and the connect-timeout guard.
pub(crate) fn schedule<F>(runtime: &Handle, delay: Duration, on_fire: F) -> TaskGuard
where
    F: FnOnce() + Send + 'static,
{
    TaskGuard::spawn(runtime, async move {
        tokio::time::sleep(delay).await;
        on_fire();
    })
}
