//! Periodic pass over every patient.
//!
//! Disabled patients lose all their tracks. Enabled patients get an
//! identity audit, and a High or Emergency forecast is pushed through the
//! alert path (dedup keeps this quiet between changes). Routine forecasts
//! send nothing from a sweep.

use crate::config::SweepConfig;
use crate::error::Result;
use crate::patient::{Patient, PatientRegistry};
use crate::risk::WeatherRiskFeed;
use crate::scheduler::controller::MonitoringController;
use crate::scheduler::intake::WeatherOutcome;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub visited: usize,
    /// Disabled patients whose tracks were cancelled.
    pub disabled_cancelled: usize,
    pub alerts_triggered: usize,
    /// Identities that held duplicate jobs.
    pub duplicates_healed: usize,
    pub failures: usize,
}

enum PatientResult {
    Disabled,
    Checked { alerted: bool, healed: usize },
    Failed,
}

/// Sweep every patient with at most `concurrency` in flight.
pub async fn run_sweep(
    controller: &MonitoringController,
    registry: &dyn PatientRegistry,
    weather: &dyn WeatherRiskFeed,
    concurrency: usize,
) -> Result<SweepReport> {
    let patients = registry.patients().await?;
    let report = stream::iter(patients)
        .map(|patient| sweep_patient(controller, weather, patient))
        .buffer_unordered(concurrency.max(1))
        .fold(SweepReport::default(), |mut report, result| async move {
            report.visited += 1;
            match result {
                PatientResult::Disabled => report.disabled_cancelled += 1,
                PatientResult::Checked { alerted, healed } => {
                    report.alerts_triggered += usize::from(alerted);
                    report.duplicates_healed += healed;
                }
                PatientResult::Failed => report.failures += 1,
            }
            report
        })
        .await;

    info!(
        visited = report.visited,
        disabled = report.disabled_cancelled,
        alerts = report.alerts_triggered,
        healed = report.duplicates_healed,
        failures = report.failures,
        "patient sweep complete"
    );
    Ok(report)
}

async fn sweep_patient(
    controller: &MonitoringController,
    weather: &dyn WeatherRiskFeed,
    patient: Patient,
) -> PatientResult {
    if !patient.monitoring_enabled {
        return match controller.cancel_all(&patient.id).await {
            Ok(_) => PatientResult::Disabled,
            Err(e) => {
                warn!(patient_id = %patient.id, "could not cancel tracks: {e}");
                PatientResult::Failed
            }
        };
    }

    let checked = async {
        let urgency = weather.urgency_for(&patient).await?;
        let outcome = if urgency.starts_chain() {
            Some(
                controller
                    .trigger_weather_alert(&patient.id, urgency, None)
                    .await?,
            )
        } else {
            None
        };
        let healed = controller.audit_patient(&patient.id).await?;
        Ok::<_, crate::error::MonitorError>((outcome, healed))
    };

    match checked.await {
        Ok((outcome, healed)) => {
            debug!(patient_id = %patient.id, ?outcome, healed, "patient swept");
            PatientResult::Checked {
                alerted: matches!(
                    outcome,
                    Some(WeatherOutcome::Alerted | WeatherOutcome::ChainStarted { .. })
                ),
                healed,
            }
        }
        Err(e) => {
            warn!(patient_id = %patient.id, "sweep failed: {e}");
            PatientResult::Failed
        }
    }
}

/// Run [`run_sweep`] every `config.interval_secs` until `shutdown`.
pub fn spawn_sweep_loop(
    controller: Arc<MonitoringController>,
    registry: Arc<dyn PatientRegistry>,
    weather: Arc<dyn WeatherRiskFeed>,
    config: SweepConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(config.interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("sweep loop shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = run_sweep(
                        &controller,
                        registry.as_ref(),
                        weather.as_ref(),
                        config.concurrency,
                    )
                    .await
                    {
                        warn!("patient sweep failed: {e}");
                    }
                }
            }
        }
    })
}
