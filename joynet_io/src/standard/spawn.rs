use crate::CancellationToken;
use std::future::Future;
pub use tokio::task::{spawn, AbortHandle, JoinHandle};

/// Spawns `future` so that it stops as soon as `token` is cancelled. Returns the handle so the owner
/// can additionally abort the task on its own schedule
pub fn spawn_cancellable<F>(token: CancellationToken, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::task::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = future => {}
        }
    })
}
