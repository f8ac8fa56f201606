//! Entry points that turn external events into chains.

use crate::dedup::AlertKey;
use crate::dispatch::{Notification, NotificationKind};
use crate::error::{MonitorError, Result};
use crate::patient::Patient;
use crate::scheduler::controller::{MonitoringController, StartRequest};
use crate::scheduler::job::{JobHandle, JobId};
use crate::scheduler::policy::{EscalationLevel, WeatherUrgency};
use crate::scheduler::tracks::MonitoringTrack;
use serde_json::json;
use tracing::{debug, info, warn};

/// Result of a symptom report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymptomOutcome {
    /// A chain was started (or replaced by a more urgent one).
    Started {
        level: EscalationLevel,
        handle: JobHandle,
    },
    /// An equally or more urgent chain is already running.
    Unchanged { level: EscalationLevel },
    /// Emergency guidance went out and an Emergency chain is running.
    Emergency {
        handle: Option<JobHandle>,
        guidance_sent: bool,
    },
    MonitoringDisabled,
}

/// Result of a weather trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherOutcome {
    /// Same alert went out recently.
    Suppressed,
    /// Alert sent; no chain needed or a stronger one is running.
    Alerted,
    /// Alert sent and a follow-up chain started.
    ChainStarted { handle: JobHandle },
    MonitoringDisabled,
}

impl MonitoringController {
    /// Classify a free-text symptom report and start or upgrade the
    /// symptom chain.
    pub async fn report_symptoms(&self, patient_id: &str, text: &str) -> Result<SymptomOutcome> {
        let Some(patient) = self.enabled_patient(patient_id).await? else {
            return Ok(SymptomOutcome::MonitoringDisabled);
        };
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| MonitorError::Classifier("no risk classifier configured".to_owned()))?;

        let assessment = classifier.assess(text, &patient).await?;
        let level = assessment.effective_level();
        let context = Some(json!({ "symptoms": text }));
        debug!(patient_id, %level, emergency = assessment.emergency_flag, "symptoms assessed");

        let guidance_sent = if assessment.emergency_flag {
            self.send_emergency_guidance(patient_id, context.clone())
                .await
        } else {
            false
        };

        let id = JobId::for_track(MonitoringTrack::Symptom, patient_id);
        let _guard = self.locks.lock(&id).await;
        let current = self.resolve_locked(&id).await?.map(|job| job.payload.level);

        let handle = match current {
            Some(active) if level <= active => {
                debug!(patient_id, %active, reported = %level, "symptom chain unchanged");
                None
            }
            _ => Some(
                self.start_locked(
                    &id,
                    StartRequest::new(patient_id, MonitoringTrack::Symptom, level)
                        .with_context(context),
                )
                .await?,
            ),
        };

        Ok(match (level, handle) {
            (EscalationLevel::Emergency, handle) => SymptomOutcome::Emergency {
                handle,
                guidance_sent,
            },
            (level, Some(handle)) => SymptomOutcome::Started { level, handle },
            (_, None) => SymptomOutcome::Unchanged {
                level: current.unwrap_or(level),
            },
        })
    }

    /// Send a heat alert and, for High or Emergency urgency, start the
    /// weather follow-up chain. Repeats within the dedup window are dropped.
    pub async fn trigger_weather_alert(
        &self,
        patient_id: &str,
        urgency: WeatherUrgency,
        context: Option<serde_json::Value>,
    ) -> Result<WeatherOutcome> {
        if self.enabled_patient(patient_id).await?.is_none() {
            return Ok(WeatherOutcome::MonitoringDisabled);
        }

        let key = AlertKey::new(patient_id, urgency);
        if !self.dedup.first_seen(key.clone()).await {
            debug!(patient_id, urgency = urgency.as_str(), "weather alert suppressed");
            return Ok(WeatherOutcome::Suppressed);
        }

        let notification = Notification::new(NotificationKind::WeatherAlert { urgency })
            .for_track(MonitoringTrack::WeatherAlert)
            .with_context(context.clone());
        if let Err(e) = self.dispatcher.send(patient_id, &notification).await {
            // Let the next trigger try again.
            self.dedup.forget(&key).await;
            warn!(patient_id, urgency = urgency.as_str(), "weather alert not delivered: {e}");
            return Err(e);
        }
        info!(patient_id, urgency = urgency.as_str(), "weather alert sent");

        if !urgency.starts_chain() {
            return Ok(WeatherOutcome::Alerted);
        }

        let level = urgency.as_level();
        let id = JobId::for_track(MonitoringTrack::WeatherAlert, patient_id);
        let _guard = self.locks.lock(&id).await;
        if let Some(active) = self.resolve_locked(&id).await? {
            if active.payload.level >= level {
                return Ok(WeatherOutcome::Alerted);
            }
        }
        let handle = self
            .start_locked(
                &id,
                StartRequest::new(patient_id, MonitoringTrack::WeatherAlert, level)
                    .with_context(context),
            )
            .await?;
        Ok(WeatherOutcome::ChainStarted { handle })
    }

    /// Start daily check-ins for a newly registered patient.
    pub async fn registration_completed(
        &self,
        patient_id: &str,
        context: Option<serde_json::Value>,
    ) -> Result<JobHandle> {
        self.start(
            StartRequest::new(patient_id, MonitoringTrack::Daily, EscalationLevel::Low)
                .with_context(context),
        )
        .await
    }

    /// `Ok(None)` when the patient has opted out.
    async fn enabled_patient(&self, patient_id: &str) -> Result<Option<Patient>> {
        let patient = self
            .registry
            .patient(patient_id)
            .await?
            .ok_or_else(|| MonitorError::UnknownPatient(patient_id.to_owned()))?;
        Ok(patient.monitoring_enabled.then_some(patient))
    }
}
