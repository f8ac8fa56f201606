use crate::helpers::{Harness, StaticWeather};
use heatwatch::dispatch::NotificationKind;
use heatwatch::ops::OpsAlertKind;
use heatwatch::scheduler::{
    EscalationLevel, FireOutcome, JobId, JobSchedule, JobStore, MonitoringTrack, StartRequest,
    WeatherOutcome, WeatherUrgency, run_sweep,
};

#[tokio::test]
async fn duplicate_weather_alert_is_suppressed() {
    let h = Harness::new(&["p1"]);
    let first = h
        .controller
        .trigger_weather_alert("p1", WeatherUrgency::High, None)
        .await
        .unwrap();
    assert!(matches!(first, WeatherOutcome::ChainStarted { .. }));

    let second = h
        .controller
        .trigger_weather_alert("p1", WeatherUrgency::High, None)
        .await
        .unwrap();
    assert_eq!(second, WeatherOutcome::Suppressed);

    assert_eq!(
        h.dispatcher.kinds_for("p1"),
        vec![NotificationKind::WeatherAlert {
            urgency: WeatherUrgency::High
        }]
    );
    assert_eq!(h.pending("p1", MonitoringTrack::WeatherAlert), 1);
}

#[tokio::test]
async fn routine_weather_alerts_without_a_chain() {
    let h = Harness::new(&["p1"]);
    let outcome = h
        .controller
        .trigger_weather_alert("p1", WeatherUrgency::Routine, None)
        .await
        .unwrap();
    assert_eq!(outcome, WeatherOutcome::Alerted);
    assert_eq!(h.dispatcher.count(), 1);
    assert_eq!(h.pending("p1", MonitoringTrack::WeatherAlert), 0);
}

#[tokio::test]
async fn undelivered_alert_can_be_retried() {
    let h = Harness::new(&["p1"]);
    h.dispatcher.set_failing(true);
    assert!(
        h.controller
            .trigger_weather_alert("p1", WeatherUrgency::Emergency, None)
            .await
            .is_err()
    );
    assert_eq!(h.pending("p1", MonitoringTrack::WeatherAlert), 0);

    h.dispatcher.set_failing(false);
    let retry = h
        .controller
        .trigger_weather_alert("p1", WeatherUrgency::Emergency, None)
        .await
        .unwrap();
    assert!(matches!(retry, WeatherOutcome::ChainStarted { .. }));
}

#[tokio::test]
async fn weaker_alert_keeps_stronger_chain() {
    let h = Harness::new(&["p1"]);
    h.controller
        .trigger_weather_alert("p1", WeatherUrgency::Emergency, None)
        .await
        .unwrap();
    let outcome = h
        .controller
        .trigger_weather_alert("p1", WeatherUrgency::High, None)
        .await
        .unwrap();
    assert_eq!(outcome, WeatherOutcome::Alerted);

    let jobs = h.jobs("p1", MonitoringTrack::WeatherAlert).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].payload.level, EscalationLevel::Emergency);
}

#[tokio::test]
async fn high_weather_chain_runs_its_course() {
    let h = Harness::new(&["p1"]);
    h.controller
        .trigger_weather_alert("p1", WeatherUrgency::High, None)
        .await
        .unwrap();

    let mut fires = Vec::new();
    for _ in 0..10 {
        h.advance(30);
        fires.extend(h.fire_due_ok().await);
    }
    assert_eq!(fires.len(), 8);
    assert_eq!(fires.last(), Some(&FireOutcome::Terminated));
    assert_eq!(h.pending("p1", MonitoringTrack::WeatherAlert), 0);
}

#[tokio::test]
async fn sweep_cancels_every_track_of_disabled_patient() {
    let h = Harness::new(&["p1", "p2"]);
    for patient in ["p1", "p2"] {
        h.controller
            .registration_completed(patient, None)
            .await
            .unwrap();
    }
    h.controller
        .start(StartRequest::new(
            "p2",
            MonitoringTrack::Symptom,
            EscalationLevel::Emergency,
        ))
        .await
        .unwrap();
    h.controller
        .start(StartRequest::new(
            "p2",
            MonitoringTrack::WeatherAlert,
            EscalationLevel::High,
        ))
        .await
        .unwrap();
    h.controller
        .schedule_safety_followup("p2", None)
        .await
        .unwrap();
    h.registry.set_enabled("p2", false);

    let weather = StaticWeather::default();
    let report = run_sweep(&h.controller, h.registry.as_ref(), &weather, 4)
        .await
        .unwrap();

    assert_eq!(report.visited, 2);
    assert_eq!(report.disabled_cancelled, 1);
    assert_eq!(report.failures, 0);
    for track in MonitoringTrack::ALL {
        assert_eq!(h.pending("p2", track), 0, "{track} left behind");
    }
    assert_eq!(h.followups("p2"), 0);
    assert_eq!(h.pending("p1", MonitoringTrack::Daily), 1);
}

#[tokio::test]
async fn sweep_alerts_on_forecast_and_stays_quiet_on_repeat() {
    let h = Harness::new(&["p1", "p2"]);
    let weather = StaticWeather::default();
    weather.set("p1", WeatherUrgency::Emergency);

    let first = run_sweep(&h.controller, h.registry.as_ref(), &weather, 2)
        .await
        .unwrap();
    // p1 gets an emergency alert with a chain; p2's routine day sends nothing.
    assert_eq!(first.visited, 2);
    assert_eq!(first.alerts_triggered, 1);
    assert_eq!(h.pending("p1", MonitoringTrack::WeatherAlert), 1);
    assert_eq!(h.pending("p2", MonitoringTrack::WeatherAlert), 0);
    assert!(h.dispatcher.kinds_for("p2").is_empty());

    let second = run_sweep(&h.controller, h.registry.as_ref(), &weather, 2)
        .await
        .unwrap();
    assert_eq!(second.alerts_triggered, 0);
    assert_eq!(h.dispatcher.count(), 1);
}

#[tokio::test]
async fn sweep_heals_duplicate_jobs() {
    let mut h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Low,
        ))
        .await
        .unwrap();

    // Bypass the controller to plant a duplicate.
    let id = JobId::for_track(MonitoringTrack::Symptom, "p1");
    let mut planted = h.jobs("p1", MonitoringTrack::Symptom).await[0].payload.clone();
    planted.level = EscalationLevel::High;
    let newest = h
        .store
        .inner
        .enqueue(&id, planted, JobSchedule::At(h.now()))
        .await
        .unwrap();

    let report = run_sweep(&h.controller, h.registry.as_ref(), &StaticWeather::default(), 1)
        .await
        .unwrap();
    assert_eq!(report.duplicates_healed, 1);

    let jobs = h.jobs("p1", MonitoringTrack::Symptom).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].handle, newest);
    let alert = h.alerts.try_recv().expect("integrity alert");
    assert_eq!(alert.kind, OpsAlertKind::IntegrityViolation);
}
