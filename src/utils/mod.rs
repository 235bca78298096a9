//! Task supervision helpers shared by both pipelines: spawn a future,
//! retry it with backoff on failure or panic, and cooperate with
//! [`crate::shutdown::Shutdown`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::Either;
use futures::{FutureExt, StreamExt};
use tokio::select;
use tokio::task::JoinHandle;
use tracing::error;

use crate::shutdown::Shutdown;

/// Spawns a future that retries on failure or panic until it succeeds or
/// a shutdown signal arrives, at which point the task is cancelled
/// immediately rather than allowed to finish.
pub fn spawn_with_backoff_cancel_on_shutdown<S, F>(
    future_spawner: S,
    backoff_duration: Duration,
    shutdown: Shutdown,
) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
    S: Fn() -> F + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let shutting_down = AtomicBool::new(false);
        select! {
            _ = retry_future(future_spawner, backoff_duration, &shutting_down) => {},
            _ = await_shutdown_begin(shutdown, &shutting_down) => {},
        }
    })
}

/// Spawns a future that retries on failure or panic until it succeeds or
/// a shutdown signal arrives, at which point the in-flight attempt is
/// allowed to finish (e.g. to flush a partially-written batch).
pub fn spawn_with_backoff<S, F>(
    future_spawner: S,
    backoff_duration: Duration,
    shutdown: Shutdown,
) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
    S: Fn() -> F + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let shutting_down = AtomicBool::new(false);
        let retry = Either::Left(retry_future(future_spawner, backoff_duration, &shutting_down));
        let shutdown = Either::Right(await_shutdown_begin(shutdown, &shutting_down));

        futures::stream::iter(vec![retry, shutdown])
            .buffered(2)
            .next()
            .await;
    })
}

async fn await_shutdown_begin(shutdown: Shutdown, shutting_down: &AtomicBool) {
    shutdown.await_shutdown_begin().await;
    shutting_down.store(true, Ordering::SeqCst);
}

async fn retry_future<S, F>(future_spawner: S, backoff_duration: Duration, shutting_down: &AtomicBool)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
    S: Fn() -> F + Send + Sync + 'static,
{
    loop {
        let future = std::panic::AssertUnwindSafe(future_spawner());
        let result = future.catch_unwind().await;

        match result {
            Ok(Ok(())) => return,
            Ok(Err(error)) => {
                error!(?error, "task failed");
            }
            Err(panic) => {
                error!(?panic, "task panicked");
            }
        }

        if shutting_down.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(backoff_duration).await;
    }
}
