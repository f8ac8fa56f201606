use crate::helpers::Harness;
use chrono::{Duration, TimeZone, Utc};
use heatwatch::MonitorError;
use heatwatch::dispatch::NotificationKind;
use heatwatch::ops::OpsAlertKind;
use heatwatch::scheduler::{
    ChainState, EscalationLevel, FireOutcome, MonitoringTrack, StartRequest,
};

#[tokio::test]
async fn bounded_chain_fires_exactly_total_checks_times() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(
            StartRequest::new("p1", MonitoringTrack::Symptom, EscalationLevel::Low)
                .with_total_checks(4),
        )
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..6 {
        h.advance(60);
        outcomes.extend(h.fire_due_ok().await);
    }

    assert_eq!(outcomes.len(), 4);
    assert!(matches!(
        outcomes[0],
        FireOutcome::Rescheduled { sequence: 2, .. }
    ));
    assert_eq!(outcomes[3], FireOutcome::Terminated);
    let checkins = h
        .dispatcher
        .kinds_for("p1")
        .into_iter()
        .filter(|k| matches!(k, NotificationKind::SymptomCheckin { .. }))
        .count();
    assert_eq!(checkins, 4);
    // One start plus three successors; no fifth job.
    assert_eq!(h.store.enqueues(), 4);
    assert_eq!(
        h.controller
            .chain_state("p1", MonitoringTrack::Symptom)
            .await
            .unwrap(),
        ChainState::Idle
    );
}

#[tokio::test]
async fn escalate_then_cancel_leaves_no_jobs() {
    let h = Harness::new(&["p1"]);
    h.controller
        .escalate(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::from_label("urgent"),
        )
        .await
        .unwrap();
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 1);

    assert!(
        h.controller
            .cancel("p1", MonitoringTrack::Symptom)
            .await
            .unwrap()
    );
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 0);
    assert_eq!(h.followups("p1"), 0);
}

#[tokio::test]
async fn concurrent_starts_leave_one_job() {
    let h = Harness::new(&["p1"]);
    let levels = [
        EscalationLevel::Low,
        EscalationLevel::Medium,
        EscalationLevel::High,
        EscalationLevel::Critical,
    ];

    let mut tasks = Vec::new();
    for i in 0..32 {
        let controller = h.controller.clone();
        let level = levels[i % levels.len()];
        tasks.push(tokio::spawn(async move {
            controller
                .start(StartRequest::new("p1", MonitoringTrack::Symptom, level))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 1);
    assert_eq!(h.jobs("p1", MonitoringTrack::Symptom).await.len(), 1);
}

#[tokio::test]
async fn daily_started_after_anchor_fires_next_morning_then_repeats_natively() {
    let start = Utc.with_ymd_and_hms(2026, 7, 14, 9, 5, 0).unwrap();
    let h = Harness::starting_at(&["p1"], start);
    h.controller
        .registration_completed("p1", None)
        .await
        .unwrap();

    let next_morning = Utc.with_ymd_and_hms(2026, 7, 15, 9, 0, 0).unwrap();
    let jobs = h.jobs("p1", MonitoringTrack::Daily).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].next_due, next_morning);

    h.clock.set(next_morning - Duration::minutes(1));
    assert!(h.fire_due_ok().await.is_empty());

    h.clock.set(next_morning);
    assert_eq!(h.fire_due_ok().await, vec![FireOutcome::Repeating]);

    h.clock.set(next_morning + Duration::hours(24));
    assert_eq!(h.fire_due_ok().await, vec![FireOutcome::Repeating]);

    assert_eq!(
        h.dispatcher.kinds_for("p1"),
        vec![NotificationKind::DailyCheckin, NotificationKind::DailyCheckin]
    );
    // The registration enqueue is the only one.
    assert_eq!(h.store.enqueues(), 1);
    assert_eq!(h.pending("p1", MonitoringTrack::Daily), 1);
}

#[tokio::test]
async fn cancelled_job_fires_stale() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::High,
        ))
        .await
        .unwrap();
    h.advance(5);
    let fired = h.store.inner.take_due(h.now());
    assert_eq!(fired.len(), 1);

    h.controller
        .cancel("p1", MonitoringTrack::Symptom)
        .await
        .unwrap();
    let outcome = h.controller.on_fire(fired[0].clone()).await.unwrap();

    assert_eq!(outcome, FireOutcome::Stale);
    assert_eq!(h.dispatcher.count(), 0);
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 0);
}

#[tokio::test]
async fn superseded_job_fires_stale() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::High,
        ))
        .await
        .unwrap();
    h.advance(5);
    let fired = h.store.inner.take_due(h.now());

    let replacement = h
        .controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Critical,
        ))
        .await
        .unwrap();

    assert_eq!(
        h.controller.on_fire(fired[0].clone()).await.unwrap(),
        FireOutcome::Stale
    );
    let jobs = h.jobs("p1", MonitoringTrack::Symptom).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].handle, replacement);
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn dispatch_failure_still_reschedules() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Medium,
        ))
        .await
        .unwrap();
    h.dispatcher.set_failing(true);
    h.advance(15);

    let outcomes = h.fire_due_ok().await;
    assert!(matches!(
        outcomes[..],
        [FireOutcome::Rescheduled { sequence: 2, .. }]
    ));
    let jobs = h.jobs("p1", MonitoringTrack::Symptom).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].next_due, h.now() + Duration::minutes(15));
}

#[tokio::test]
async fn exhausted_reschedule_raises_chain_broken() {
    let mut h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Medium,
        ))
        .await
        .unwrap();
    h.advance(15);
    h.store.fail_next_enqueues(3);

    let results = h.fire_due().await;
    assert_eq!(results.len(), 1);
    let err = results.into_iter().next().unwrap().unwrap_err();
    assert!(matches!(err, MonitorError::ChainBroken { .. }), "{err}");

    // The check-in itself went out before rescheduling was attempted.
    assert_eq!(h.dispatcher.count(), 1);
    let alert = h.alerts.try_recv().expect("ops alert raised");
    assert_eq!(alert.kind, OpsAlertKind::ChainBroken);
    assert_eq!(alert.identity, "symptom:p1");
    assert_eq!(alert.patient_id, "p1");
}

#[tokio::test]
async fn chain_broken_fire_is_redelivered_and_recovers() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Medium,
        ))
        .await
        .unwrap();
    h.advance(15);
    h.store.fail_next_enqueues(3);
    assert!(h.fire_due().await[0].is_err());
    assert_eq!(h.dispatcher.count(), 1);

    // Redelivery timeout is five minutes.
    h.advance(5);
    let outcomes = h.fire_due_ok().await;
    assert!(matches!(
        outcomes[..],
        [FireOutcome::Rescheduled { sequence: 2, .. }]
    ));
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 1);
    assert_eq!(h.jobs("p1", MonitoringTrack::Symptom).await.len(), 1);

    // The patient was polled once for the first check.
    assert_eq!(
        h.dispatcher.kinds_for("p1"),
        vec![NotificationKind::SymptomCheckin {
            level: EscalationLevel::Medium,
            sequence: 1
        }]
    );
}

#[tokio::test]
async fn emergency_cancel_keeps_chain_when_followup_cannot_be_stored() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Emergency,
        ))
        .await
        .unwrap();

    h.store.fail_next_enqueues(1);
    let err = h
        .controller
        .cancel("p1", MonitoringTrack::Symptom)
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 1);
    assert_eq!(h.followups("p1"), 0);

    assert!(
        h.controller
            .cancel("p1", MonitoringTrack::Symptom)
            .await
            .unwrap()
    );
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 0);
    assert_eq!(h.followups("p1"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fire_racing_cancel_leaves_nothing_behind() {
    for _ in 0..50 {
        let h = Harness::new(&["p1"]);
        h.controller
            .start(StartRequest::new(
                "p1",
                MonitoringTrack::Symptom,
                EscalationLevel::High,
            ))
            .await
            .unwrap();
        h.advance(5);
        let fired = h.store.inner.take_due(h.now()).remove(0);

        let firing = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.on_fire(fired).await })
        };
        let cancelling = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.cancel("p1", MonitoringTrack::Symptom).await })
        };
        let outcome = firing.await.unwrap().unwrap();
        cancelling.await.unwrap().unwrap();

        assert!(
            h.jobs("p1", MonitoringTrack::Symptom).await.is_empty(),
            "fire outcome {outcome:?} left a job"
        );
        assert!(h.dispatcher.count() <= 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fire_racing_escalate_leaves_one_escalated_job() {
    for _ in 0..50 {
        let h = Harness::new(&["p1"]);
        h.controller
            .start(StartRequest::new(
                "p1",
                MonitoringTrack::Symptom,
                EscalationLevel::High,
            ))
            .await
            .unwrap();
        h.advance(5);
        let fired = h.store.inner.take_due(h.now()).remove(0);

        let firing = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.on_fire(fired).await })
        };
        let escalating = {
            let controller = h.controller.clone();
            tokio::spawn(async move {
                controller
                    .escalate("p1", MonitoringTrack::Symptom, EscalationLevel::Critical)
                    .await
            })
        };
        firing.await.unwrap().unwrap();
        escalating.await.unwrap().unwrap();

        let jobs = h.jobs("p1", MonitoringTrack::Symptom).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].payload.level, EscalationLevel::Critical);
        assert_eq!(jobs[0].payload.sequence_number, 1);
    }
}

#[tokio::test]
async fn failed_start_restores_previous_chain() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Low,
        ))
        .await
        .unwrap();
    let before = h.jobs("p1", MonitoringTrack::Symptom).await;

    h.store.fail_next_enqueues(1);
    let err = h
        .controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::High,
        ))
        .await
        .unwrap_err();
    assert!(err.is_transient());

    let after = h.jobs("p1", MonitoringTrack::Symptom).await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].payload, before[0].payload);
    assert_eq!(after[0].next_due, before[0].next_due);
}

#[tokio::test]
async fn disabled_patient_chain_is_dropped_at_fire() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::High,
        ))
        .await
        .unwrap();
    h.registry.set_enabled("p1", false);
    h.advance(5);

    assert_eq!(
        h.fire_due_ok().await,
        vec![FireOutcome::MonitoringDisabled]
    );
    assert_eq!(h.dispatcher.count(), 0);
    assert!(h.jobs("p1", MonitoringTrack::Symptom).await.is_empty());
}

#[tokio::test]
async fn emergency_chain_is_indefinite_at_one_minute() {
    let h = Harness::new(&["p1"]);
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::Emergency,
        ))
        .await
        .unwrap();

    for expected in 2..=30 {
        h.advance(1);
        let outcomes = h.fire_due_ok().await;
        assert!(
            matches!(outcomes[..], [FireOutcome::Rescheduled { sequence, .. }] if sequence == expected),
            "{outcomes:?}"
        );
    }
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 1);
}

#[tokio::test]
async fn tracks_are_independent() {
    let h = Harness::new(&["p1"]);
    h.controller
        .registration_completed("p1", None)
        .await
        .unwrap();
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::Symptom,
            EscalationLevel::High,
        ))
        .await
        .unwrap();
    h.controller
        .start(StartRequest::new(
            "p1",
            MonitoringTrack::WeatherAlert,
            EscalationLevel::High,
        ))
        .await
        .unwrap();

    h.controller
        .cancel("p1", MonitoringTrack::WeatherAlert)
        .await
        .unwrap();
    assert_eq!(h.pending("p1", MonitoringTrack::Daily), 1);
    assert_eq!(h.pending("p1", MonitoringTrack::Symptom), 1);
    assert_eq!(h.pending("p1", MonitoringTrack::WeatherAlert), 0);
}
