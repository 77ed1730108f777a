use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::config::{AlarmConfig, NotificationConfig};
use crate::engine::backend::SystemTimeSource;
use crate::notify::{RecordingNotifier, Snapshot, StaticSnapshot};
use crate::telemetry::{SentinelEventKind, SkipReason, TelemetryCollector};

struct Harness {
    arbiter: AlarmArbiter,
    dispatcher: Arc<AlertDispatcher>,
    notifier: Arc<RecordingNotifier>,
    telemetry: Arc<TelemetryCollector>,
}

fn harness() -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let telemetry = Arc::new(TelemetryCollector::default());
    let time = Arc::new(SystemTimeSource::new());
    let dispatcher = Arc::new(AlertDispatcher::new(
        &NotificationConfig::default(),
        notifier.clone(),
        Arc::new(StaticSnapshot::new(Snapshot::new("AAAA", "image/png"))),
        time.clone(),
        telemetry.clone(),
    ));
    let arbiter = AlarmArbiter::new(
        &AlarmConfig::default(),
        Arc::clone(&dispatcher),
        time,
        telemetry.clone(),
    );
    Harness {
        arbiter,
        dispatcher,
        notifier,
        telemetry,
    }
}

fn with_recipient() -> Harness {
    let h = harness();
    h.dispatcher.add_recipient("guard@example.com").unwrap();
    h
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_episode_sends_once_after_delay() {
    let h = with_recipient();
    h.arbiter.set_fear(true);
    let status = h.arbiter.set_rhythmic(true);
    assert_eq!(status.state, AlarmState::Active);
    assert!(status.alert_sent);

    advance(999).await;
    assert_eq!(h.notifier.sent_count(), 0);
    advance(100).await;
    assert_eq!(h.notifier.sent_count(), 1);
    assert!(h.notifier.sent()[0].is_alarm());

    // Staying Active never sends a second alert
    h.arbiter.set_fear(true);
    advance(5000).await;
    assert_eq!(h.notifier.sent_count(), 1);
}

fn first_active_at(telemetry: &TelemetryCollector) -> u64 {
    telemetry.recent_matching(|kind| {
        matches!(
            kind,
            SentinelEventKind::AlarmChanged {
                to: AlarmState::Active,
                ..
            }
        )
    })[0]
        .timestamp_ms
}

fn covered_count(telemetry: &TelemetryCollector) -> usize {
    telemetry
        .recent_matching(|kind| {
            matches!(
                kind,
                SentinelEventKind::AlertSkipped {
                    reason: SkipReason::CoveredByPending,
                    ..
                }
            )
        })
        .len()
}

#[tokio::test(start_paused = true)]
async fn test_flicker_yields_single_send_on_time() {
    let h = with_recipient();
    h.arbiter.set_fear(true);
    h.arbiter.set_rhythmic(true);
    for rhythmic in [false, true, false, true] {
        advance(60).await;
        h.arbiter.set_rhythmic(rhythmic);
    }

    advance(3000).await;
    assert_eq!(h.notifier.sent_count(), 1);
    assert_eq!(covered_count(&h.telemetry), 2);

    let delivered_at = h
        .telemetry
        .recent_matching(|kind| matches!(kind, SentinelEventKind::AlertDelivered { .. }))[0]
        .timestamp_ms;
    let delay = delivered_at - first_active_at(&h.telemetry);
    assert!((1000..=1100).contains(&delay), "delay was {delay}ms");
}

#[tokio::test(start_paused = true)]
async fn test_alarm_cycling_faster_than_delay_still_alerts() {
    let h = with_recipient();
    h.arbiter.set_fear(true);
    for step in 0..20 {
        h.arbiter.set_rhythmic(step % 2 == 0);
        advance(400).await;
    }

    // Episodes start every 800ms; each alert covers the episode after it
    assert_eq!(h.arbiter.status().episode, 10);
    assert_eq!(h.notifier.sent_count(), 5);
    assert_eq!(covered_count(&h.telemetry), 5);
}

#[tokio::test(start_paused = true)]
async fn test_short_episode_still_sends() {
    let h = with_recipient();
    h.arbiter.set_fear(true);
    h.arbiter.set_rhythmic(true);
    advance(400).await;
    assert_eq!(h.arbiter.set_fear(false).state, AlarmState::Idle);

    advance(700).await;
    assert_eq!(h.notifier.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_recipients_schedules_nothing_until_added() {
    let h = harness();
    h.arbiter.set_fear(true);
    let status = h.arbiter.set_rhythmic(true);
    assert!(!status.alert_sent);
    assert_eq!(h.arbiter.pending_alerts(), 0);

    advance(1500).await;
    assert_eq!(h.notifier.sent_count(), 0);

    h.dispatcher.add_recipient("late@example.com").unwrap();
    assert!(h.arbiter.recipients_changed().alert_sent);
    advance(1001).await;
    assert_eq!(h.notifier.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_alarm_send_not_retried_within_episode() {
    let h = with_recipient();
    h.notifier.fail_next("relay down");
    h.arbiter.set_fear(true);
    h.arbiter.set_rhythmic(true);
    advance(1100).await;
    assert_eq!(h.notifier.sent_count(), 0);

    advance(5000).await;
    assert_eq!(h.notifier.sent_count(), 0);

    // Next episode tries again
    h.arbiter.set_rhythmic(false);
    h.arbiter.set_rhythmic(true);
    advance(1001).await;
    assert_eq!(h.notifier.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_alert() {
    let h = with_recipient();
    h.arbiter.set_fear(true);
    h.arbiter.set_rhythmic(true);
    assert_eq!(h.arbiter.pending_alerts(), 1);

    h.arbiter.shutdown();
    advance(5000).await;
    assert_eq!(h.notifier.sent_count(), 0);

    // Input after shutdown is ignored
    h.arbiter.set_rhythmic(false);
    h.arbiter.set_rhythmic(true);
    advance(2000).await;
    assert_eq!(h.notifier.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_status_watch_follows_transitions() {
    let h = with_recipient();
    let mut rx = h.arbiter.subscribe();
    h.arbiter.set_fear(true);
    h.arbiter.set_rhythmic(true);

    assert!(rx.has_changed().unwrap());
    let status = *rx.borrow_and_update();
    assert_eq!(status.state, AlarmState::Active);
    assert_eq!(status.episode, 1);
}
