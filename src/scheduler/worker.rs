//! Bounded pool running fire handlers.

use crate::scheduler::controller::{FireOutcome, MonitoringController};
use crate::scheduler::job::FiredJob;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consumes fired jobs and runs [`MonitoringController::on_fire`] with at
/// most `concurrency` handlers in flight.
pub struct FireWorker {
    controller: Arc<MonitoringController>,
    concurrency: usize,
}

impl FireWorker {
    pub fn new(controller: Arc<MonitoringController>, concurrency: usize) -> Self {
        Self {
            controller,
            concurrency: concurrency.max(1),
        }
    }

    /// Run until `shutdown` is cancelled or the channel closes, then wait
    /// for in-flight handlers.
    pub fn spawn(
        self,
        mut rx: mpsc::Receiver<FiredJob>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(self.concurrency));
            info!("fire worker started (concurrency {})", self.concurrency);

            loop {
                let fired = tokio::select! {
                    () = shutdown.cancelled() => break,
                    fired = rx.recv() => match fired {
                        Some(fired) => fired,
                        None => break,
                    },
                };

                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let controller = Arc::clone(&self.controller);
                tokio::spawn(async move {
                    run_one(&controller, fired).await;
                    drop(permit);
                });
            }

            let all = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
            if permits.acquire_many(all).await.is_err() {
                warn!("fire worker semaphore closed during drain");
            }
            debug!("fire worker stopped");
        })
    }
}

async fn run_one(controller: &MonitoringController, fired: FiredJob) {
    let identity = fired.id.clone();
    match controller.on_fire(fired).await {
        Ok(FireOutcome::Rescheduled { sequence, .. }) => {
            debug!(%identity, sequence, "fire handled, successor enqueued");
        }
        Ok(outcome) => debug!(%identity, ?outcome, "fire handled"),
        Err(e) => error!(%identity, "fire handler failed: {e}"),
    }
}
