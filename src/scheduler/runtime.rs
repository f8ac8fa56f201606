//! Background tasks that keep chains moving.
//!
//! [`MonitoringRuntime::spawn`] wires the job store ticker, the fire
//! worker and the periodic patient sweep from [`MonitorConfig`] and ties
//! them to one shutdown token.

use crate::config::MonitorConfig;
use crate::patient::PatientRegistry;
use crate::risk::WeatherRiskFeed;
use crate::scheduler::controller::MonitoringController;
use crate::scheduler::memory_store::InMemoryJobStore;
use crate::scheduler::sweep::spawn_sweep_loop;
use crate::scheduler::worker::FireWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fired jobs buffered per worker slot.
const QUEUE_PER_SLOT: usize = 4;

/// Running ticker, worker and sweep.
pub struct MonitoringRuntime {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitoringRuntime {
    /// Start every background task on the current tokio runtime.
    ///
    /// The ticker polls `store` on the controller's clock every
    /// `worker.tick_ms`; at most `worker.concurrency` fires run at once;
    /// the sweep runs immediately and then every `sweep.interval_secs`.
    pub fn spawn(
        config: &MonitorConfig,
        controller: Arc<MonitoringController>,
        store: Arc<InMemoryJobStore>,
        registry: Arc<dyn PatientRegistry>,
        weather: Arc<dyn WeatherRiskFeed>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let concurrency = config.worker.concurrency.max(1);
        let (tx, rx) = mpsc::channel(concurrency.saturating_mul(QUEUE_PER_SLOT));

        let ticker = store.spawn_ticker(
            Arc::clone(&controller.clock),
            Duration::from_millis(config.worker.tick_ms.max(1)),
            tx,
            shutdown.child_token(),
        );
        let worker =
            FireWorker::new(Arc::clone(&controller), concurrency).spawn(rx, shutdown.child_token());
        let sweep = spawn_sweep_loop(
            controller,
            registry,
            weather,
            config.sweep.clone(),
            shutdown.child_token(),
        );

        info!(
            tick_ms = config.worker.tick_ms,
            concurrency,
            sweep_secs = config.sweep.interval_secs,
            "monitoring runtime started"
        );
        Self {
            shutdown,
            tasks: vec![ticker, worker, sweep],
        }
    }

    /// Token that stops the runtime when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every task and wait for in-flight fires to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("monitoring task ended abnormally: {e}");
            }
        }
        info!("monitoring runtime stopped");
    }
}
