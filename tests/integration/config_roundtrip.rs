use crate::helpers::{Harness, noon};
use heatwatch::MonitorConfig;
use heatwatch::scheduler::{EscalationLevel, FireOutcome, MonitoringTrack, StartRequest};

#[test]
fn config_survives_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = MonitorConfig::default();
    config.policy.symptom_low_checks = 2;
    config.daily.hour = 7;
    config.daily.utc_offset_minutes = -240;
    config.safety_followup_minutes = 10;
    config.save_to_file(&path).expect("save");

    let loaded = MonitorConfig::from_file(&path).expect("load");
    assert_eq!(loaded.policy.symptom_low_checks, 2);
    assert_eq!(loaded.daily.hour, 7);
    assert_eq!(loaded.daily.utc_offset_minutes, -240);
    assert_eq!(loaded.safety_followup_minutes, 10);
    assert_eq!(loaded.worker.concurrency, config.worker.concurrency);
}

#[test]
fn partial_file_falls_back_to_defaults() {
    let loaded = MonitorConfig::from_toml_str("[policy]\nsymptom_high_checks = 3\n").expect("parse");
    assert_eq!(loaded.policy.symptom_high_checks, 3);
    assert_eq!(loaded.policy.symptom_medium_checks, 8);
    assert_eq!(loaded.daily.hour, 9);
}

#[tokio::test]
async fn configured_chain_length_drives_controller() {
    let mut config = crate::helpers::test_config();
    config.policy.symptom_low_checks = 2;
    let h = Harness::with_config(&["p1"], config, noon());
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Low,
        ))
        .await
        .unwrap();

    h.advance(60);
    assert!(matches!(
        h.fire_due_ok().await[..],
        [FireOutcome::Rescheduled { sequence: 2, .. }]
    ));
    h.advance(60);
    assert_eq!(h.fire_due_ok().await, vec![FireOutcome::Terminated]);
}
