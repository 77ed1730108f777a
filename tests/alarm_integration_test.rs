// Integration tests for the full watcher: scripted audio in, alerts out.
//
// All tests run on tokio's paused clock so delays and holds are exact.

use std::sync::Arc;
use std::time::Duration;

use clapwatch::alarm::AlarmState;
use clapwatch::analysis::AmplitudeSample;
use clapwatch::config::AppConfig;
use clapwatch::engine::{ScriptedSource, SentinelHandle};
use clapwatch::error::NotifyError;
use clapwatch::notify::{AlertKind, RecordingNotifier, Snapshot, StaticSnapshot};
use clapwatch::telemetry::SentinelEventKind;

fn handle(notifier: &Arc<RecordingNotifier>) -> SentinelHandle {
    SentinelHandle::new(
        AppConfig::default(),
        notifier.clone(),
        Arc::new(StaticSnapshot::new(Snapshot::new("AAAA", "image/jpeg"))),
    )
}

fn claps(times: &[u64]) -> Box<ScriptedSource> {
    Box::new(ScriptedSource::new(
        times
            .iter()
            .map(|&t| AmplitudeSample::new(210.0, t))
            .collect(),
    ))
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn fear_then_rhythm_sends_one_alarm_after_delay() {
    let notifier = Arc::new(RecordingNotifier::new());
    let sentinel = handle(&notifier);
    sentinel.add_recipient("guard@example.com").unwrap();
    sentinel.set_fear(true);

    sentinel.start_audio(claps(&[0, 500, 1000])).await.unwrap();

    // Let the third clap land and the rhythmic flag reach the arbiter
    advance(1010).await;
    assert_eq!(sentinel.alarm_status().state, AlarmState::Active);

    advance(980).await;
    assert_eq!(notifier.sent_count(), 0);
    advance(110).await;
    assert_eq!(notifier.sent_count(), 1);

    let sent = notifier.sent();
    assert_eq!(sent[0].kind, AlertKind::Alarm);
    assert_eq!(sent[0].recipients, vec!["guard@example.com"]);

    let telemetry = sentinel.telemetry();
    let active_at = telemetry.recent_matching(|kind| {
        matches!(
            kind,
            SentinelEventKind::AlarmChanged {
                to: AlarmState::Active,
                ..
            }
        )
    })[0]
        .timestamp_ms;
    let delivered_at = telemetry
        .recent_matching(|kind| matches!(kind, SentinelEventKind::AlertDelivered { .. }))[0]
        .timestamp_ms;
    let delay = delivered_at - active_at;
    assert!((1000..=1100).contains(&delay), "delay was {delay}ms");

    sentinel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fear_flicker_during_delay_sends_once() {
    let notifier = Arc::new(RecordingNotifier::new());
    let sentinel = handle(&notifier);
    sentinel.add_recipient("guard@example.com").unwrap();

    sentinel.start_audio(claps(&[0, 500, 1000, 1500])).await.unwrap();
    advance(1010).await;
    assert!(sentinel.alarm_status().rhythmic);

    for present in [true, false, true, false, true] {
        sentinel.set_fear(present);
        advance(20).await;
    }

    advance(3000).await;
    assert_eq!(notifier.sent_count(), 1);
    sentinel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rhythm_expiry_ends_episode_and_next_episode_alerts_again() {
    let notifier = Arc::new(RecordingNotifier::new());
    let sentinel = handle(&notifier);
    sentinel.add_recipient("guard@example.com").unwrap();
    sentinel.set_fear(true);

    sentinel
        .start_audio(claps(&[0, 500, 1000, 6000, 6500, 7000]))
        .await
        .unwrap();

    advance(2500).await;
    assert_eq!(notifier.sent_count(), 1);

    // Hold expires 2000ms after the last rhythmic clap
    advance(700).await;
    assert_eq!(sentinel.alarm_status().state, AlarmState::Idle);

    advance(5000).await;
    assert_eq!(sentinel.alarm_status().episode, 2);
    assert_eq!(notifier.sent_count(), 2);
    sentinel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_send_cooldown_and_failure_semantics() {
    let notifier = Arc::new(RecordingNotifier::new());
    let sentinel = handle(&notifier);

    assert_eq!(sentinel.send_manual().await, Err(NotifyError::EmptyRecipients));
    sentinel.add_recipient("owner@example.com").unwrap();

    sentinel.send_manual().await.unwrap();
    advance(5000).await;
    match sentinel.send_manual().await {
        Err(NotifyError::CooldownActive { retry_after_ms }) => assert_eq!(retry_after_ms, 5000),
        other => panic!("expected cooldown denial, got {other:?}"),
    }

    advance(5001).await;
    notifier.fail_next("smtp timeout");
    assert!(matches!(
        sentinel.send_manual().await,
        Err(NotifyError::DeliveryFailure { .. })
    ));

    // Failure did not start a cooldown
    sentinel.send_manual().await.unwrap();
    assert_eq!(notifier.sent_count(), 2);
    assert!(notifier.sent().iter().all(|n| n.kind == AlertKind::Manual));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_alert_and_releases_input() {
    let notifier = Arc::new(RecordingNotifier::new());
    let sentinel = handle(&notifier);
    sentinel.add_recipient("guard@example.com").unwrap();
    sentinel.set_fear(true);

    let source = ScriptedSource::new(
        [0, 500, 1000]
            .iter()
            .map(|&t| AmplitudeSample::new(210.0, t))
            .collect(),
    );
    let lifecycle = source.lifecycle();
    sentinel.start_audio(Box::new(source)).await.unwrap();

    advance(1100).await;
    assert!(sentinel.alarm_status().alert_sent);

    sentinel.shutdown().await;
    assert_eq!((lifecycle.opens(), lifecycle.closes()), (1, 1));

    advance(10_000).await;
    assert_eq!(notifier.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn recipient_added_mid_episode_triggers_alert() {
    let notifier = Arc::new(RecordingNotifier::new());
    let sentinel = handle(&notifier);
    sentinel.set_fear(true);
    sentinel
        .start_audio(claps(&[0, 500, 1000, 1500, 2000, 2500]))
        .await
        .unwrap();

    advance(1100).await;
    assert_eq!(sentinel.alarm_status().state, AlarmState::Active);
    assert!(!sentinel.alarm_status().alert_sent);

    sentinel.add_recipient("late@example.com").unwrap();
    advance(1001).await;
    assert_eq!(notifier.sent_count(), 1);
    sentinel.shutdown().await;
}
