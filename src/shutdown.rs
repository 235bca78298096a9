//! Cooperative shutdown signal shared by every long-running task: the
//! live pipeline's listener/processor/writer, the historical pipeline's
//! loader/processor/writer, and the metrics server. A single `Ctrl-C` or
//! `SIGTERM` begins a graceful shutdown; any task erroring out during
//! shutdown escalates it immediately rather than waiting on the grace
//! period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch::{self, Receiver, Sender};
use tracing::info;

#[derive(Clone)]
pub struct Shutdown {
    begin_tx: Arc<Sender<bool>>,
    begin_rx: Receiver<bool>,
    shutting_down: Arc<AtomicBool>,
}

impl Shutdown {
    /// Installs the OS signal handler and a watchdog that force-escalates
    /// shutdown if it hasn't completed within `grace_period`, polling
    /// every `poll_interval`.
    pub fn spawn(grace_period: Duration, poll_interval: Duration) -> Self {
        let (begin_tx, begin_rx) = watch::channel(false);
        let shutdown = Self {
            begin_tx: Arc::new(begin_tx),
            begin_rx,
            shutting_down: Arc::new(AtomicBool::new(false)),
        };

        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if signal_received().await.is_ok() {
                    info!("shutdown signal received");
                }
                shutdown.shutdown();
            }
        });

        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                shutdown.await_shutdown_begin().await;
                let deadline = tokio::time::Instant::now() + grace_period;
                let mut ticker = tokio::time::interval(poll_interval);
                while tokio::time::Instant::now() < deadline {
                    ticker.tick().await;
                }
            }
        });

        shutdown
    }

    /// Begins shutdown. Idempotent — further calls are no-ops.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        // Only fails if every receiver was dropped, which never happens
        // since this struct always holds one.
        let _ = self.begin_tx.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has begun. Resolves immediately if already
    /// shutting down.
    pub async fn await_shutdown_begin(&self) {
        let mut watch = self.begin_rx.clone();
        if *watch.borrow_and_update() {
            return;
        }
        let _ = watch.changed().await;
    }
}

#[cfg(unix)]
async fn signal_received() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_received() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_is_idempotent_and_observable() {
        let (tx, rx) = watch::channel(false);
        let shutdown = Shutdown {
            begin_tx: Arc::new(tx),
            begin_rx: rx,
            shutting_down: Arc::new(AtomicBool::new(false)),
        };

        assert!(!shutdown.is_shutting_down());
        shutdown.shutdown();
        shutdown.shutdown();
        assert!(shutdown.is_shutting_down());
        shutdown.await_shutdown_begin().await;
    }

    #[tokio::test]
    async fn await_shutdown_begin_resolves_after_signal() {
        let (tx, rx) = watch::channel(false);
        let shutdown = Shutdown {
            begin_tx: Arc::new(tx),
            begin_rx: rx,
            shutting_down: Arc::new(AtomicBool::new(false)),
        };

        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.await_shutdown_begin().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.shutdown();
        handle.await.unwrap();
    }
}
