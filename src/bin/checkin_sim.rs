//! Check-in scheduler simulator.
//!
//! Runs the monitoring runtime against the in-memory job store on a manual
//! clock that advances one simulated minute per two worker ticks, logging
//! every notification that would have been sent. Prints the final chain
//! state of each patient as JSON on stdout.
//!
//! Usage: `heatwatch-sim [config.toml] [minutes]`

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use heatwatch::clock::{Clock, ManualClock};
use heatwatch::dispatch::{DispatchAck, Notification, NotificationDispatcher};
use heatwatch::patient::{Patient, PatientRegistry, RiskProfile};
use heatwatch::risk::{RiskAssessment, RiskClassifier, WeatherRiskFeed};
use heatwatch::scheduler::{
    EscalationLevel, InMemoryJobStore, MonitoringRuntime, MonitoringTrack, WeatherUrgency,
};
use heatwatch::{MonitorConfig, MonitoringController};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Worker tick used when no config file is given.
const SIM_TICK_MS: u64 = 10;

/// Logs notifications instead of sending them.
#[derive(Default)]
struct LogDispatcher {
    sent: AtomicUsize,
}

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(
        &self,
        patient_id: &str,
        notification: &Notification,
    ) -> heatwatch::Result<DispatchAck> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(patient_id, kind = ?notification.kind, "notification #{n}");
        Ok(DispatchAck {
            message_id: Some(format!("sim-{n}")),
        })
    }
}

struct SimRegistry(Vec<Patient>);

#[async_trait]
impl PatientRegistry for SimRegistry {
    async fn patient(&self, patient_id: &str) -> heatwatch::Result<Option<Patient>> {
        Ok(self.0.iter().find(|p| p.id == patient_id).cloned())
    }

    async fn patients(&self) -> heatwatch::Result<Vec<Patient>> {
        Ok(self.0.clone())
    }
}

/// Keyword rules standing in for the production classifier.
struct KeywordClassifier;

#[async_trait]
impl RiskClassifier for KeywordClassifier {
    async fn assess(&self, text: &str, patient: &Patient) -> heatwatch::Result<RiskAssessment> {
        let text = text.to_lowercase();
        let emergency_flag = ["fainted", "chest pain", "confused"]
            .iter()
            .any(|k| text.contains(k));
        let mut level = if ["vomiting", "racing heart"].iter().any(|k| text.contains(k)) {
            EscalationLevel::Critical
        } else if ["dizzy", "nausea", "cramps"].iter().any(|k| text.contains(k)) {
            EscalationLevel::High
        } else {
            EscalationLevel::Medium
        };
        if patient.risk.age_years.is_some_and(|age| age >= 75) {
            level = level.next_higher().min(EscalationLevel::Critical);
        }
        Ok(RiskAssessment {
            urgency_level: level,
            emergency_flag,
        })
    }
}

/// Older or medicated patients get a heat warning; everyone else a routine day.
struct SimWeather;

#[async_trait]
impl WeatherRiskFeed for SimWeather {
    async fn urgency_for(&self, patient: &Patient) -> heatwatch::Result<WeatherUrgency> {
        let vulnerable = patient.risk.heat_sensitive_medication
            || patient.risk.age_years.is_some_and(|age| age >= 75);
        Ok(if vulnerable {
            WeatherUrgency::High
        } else {
            WeatherUrgency::Routine
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => MonitorConfig::from_file(&PathBuf::from(path))?,
        None => {
            let mut config = MonitorConfig::default();
            config.worker.tick_ms = SIM_TICK_MS;
            config
        }
    };
    let minutes: i64 = match args.next() {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("minutes must be a number: {e}"))?,
        None => 24 * 60 + 60,
    };

    let start = Utc
        .with_ymd_and_hms(2026, 7, 14, 8, 30, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid simulation start time"))?;
    let clock = Arc::new(ManualClock::new(start));
    let store = Arc::new(InMemoryJobStore::new().with_redelivery_timeout(Duration::seconds(
        i64::try_from(config.worker.redelivery_timeout_secs).unwrap_or(i64::MAX),
    )));
    let dispatcher = Arc::new(LogDispatcher::default());
    let registry = Arc::new(SimRegistry(vec![
        Patient::new("amara"),
        Patient::new("walter").with_risk(RiskProfile {
            age_years: Some(81),
            chronic_conditions: vec!["copd".to_owned()],
            heat_sensitive_medication: true,
        }),
    ]));

    let controller = Arc::new(
        MonitoringController::new(
            &config,
            store.clone(),
            dispatcher.clone(),
            registry.clone(),
        )
        .with_classifier(Arc::new(KeywordClassifier))
        .with_clock(clock.clone()),
    );

    for patient in ["amara", "walter"] {
        controller.registration_completed(patient, None).await?;
    }
    controller
        .report_symptoms("amara", "a bit dizzy after the bus stop")
        .await?;

    // The first sweep raises walter's weather alert.
    let runtime = MonitoringRuntime::spawn(
        &config,
        Arc::clone(&controller),
        store,
        registry,
        Arc::new(SimWeather),
    );
    let tick = std::time::Duration::from_millis(config.worker.tick_ms);

    for minute in 1..=minutes {
        clock.advance(Duration::minutes(1));

        // Scripted replies.
        let reply = match minute {
            12 => Some(("amara", "worse")),
            30 => Some(("amara", "2")),
            45 => Some(("amara", "much better")),
            _ => None,
        };
        if let Some((patient, text)) = reply {
            let outcome = controller.handle_reply(patient, text).await?;
            info!(patient, text, ?outcome, "reply handled");
        }

        tokio::time::sleep(tick * 2).await;
    }
    runtime.shutdown().await;

    let mut summary = serde_json::Map::new();
    for patient in ["amara", "walter"] {
        let mut tracks = serde_json::Map::new();
        for track in MonitoringTrack::ALL {
            let state = controller.chain_state(patient, track).await?;
            tracks.insert(
                track.to_string(),
                serde_json::json!(state.level().map(EscalationLevel::as_str)),
            );
        }
        summary.insert(patient.to_owned(), serde_json::Value::Object(tracks));
    }

    info!(
        notifications = dispatcher.sent.load(Ordering::Relaxed),
        until = %clock.now(),
        "simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
