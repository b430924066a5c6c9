//! Polling workers and the loop that drives them.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub mod ingest;
pub mod reconcile;

pub use ingest::{IngestReport, IngestWorker};
pub use reconcile::{
    CompletionSignal, ContainerClosure, ExplicitCancellation, ReconcileReport, ReconcileWorker,
    TerminalStatusListing,
};

/// One unit of periodic work. A failed tick is logged and retried on the next
/// interval; it never stops the loop.
#[async_trait]
pub trait PollingWorker: Send + Sync {
    fn name(&self) -> String;

    async fn tick(&self) -> Result<()>;
}

/// Run `worker` every `interval` until `shutdown` is cancelled. Cancellation is
/// checked before each tick and interrupts the sleep, but never an in-flight
/// tick.
pub async fn run_periodic(
    worker: Arc<dyn PollingWorker>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let name = worker.name();
    info!(worker = %name, ?interval, "worker started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        if let Err(err) = worker.tick().await {
            error!(worker = %name, ?err, "worker cycle failed");
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!(worker = %name, "worker stopped");
}

pub fn spawn(
    worker: Arc<dyn PollingWorker>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_periodic(worker, interval, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        ticks: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PollingWorker for Counting {
        fn name(&self) -> String {
            "counting".into()
        }

        async fn tick(&self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let worker = Arc::new(Counting {
            ticks: AtomicUsize::new(0),
            fail: false,
        });
        let shutdown = CancellationToken::new();
        let handle = spawn(worker.clone(), Duration::from_millis(5), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert!(worker.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_loop() {
        let worker = Arc::new(Counting {
            ticks: AtomicUsize::new(0),
            fail: true,
        });
        let shutdown = CancellationToken::new();
        let handle = spawn(worker.clone(), Duration::from_millis(5), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown.cancel();
        handle.await.unwrap();
        assert!(worker.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_ticks() {
        let worker = Arc::new(Counting {
            ticks: AtomicUsize::new(0),
            fail: false,
        });
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        run_periodic(worker.clone(), Duration::from_secs(60), shutdown).await;
        assert_eq!(worker.ticks.load(Ordering::SeqCst), 0);
    }
}
