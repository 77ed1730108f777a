use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::NotificationConfig;
use crate::engine::backend::TimeSource;
use crate::error::{log_notify_error, ErrorCode, NotifyError};
use crate::notify::{AlertKind, Notification, Notifier, SnapshotProvider};
use crate::telemetry::{SentinelEventKind, SkipReason, TelemetryCollector};

use super::{lock_recover, NotificationThrottle, RecipientList};

/// Builds notifications and hands them to the transport.
///
/// Owns the recipient list and the manual-send throttle. Alarm sends skip
/// the throttle check but stamp it on success.
pub struct AlertDispatcher {
    recipients: Mutex<RecipientList>,
    throttle: Mutex<NotificationThrottle>,
    notifier: Arc<dyn Notifier>,
    snapshots: Arc<dyn SnapshotProvider>,
    time: Arc<dyn TimeSource>,
    telemetry: Arc<TelemetryCollector>,
    manual_in_flight: AtomicBool,
}

impl AlertDispatcher {
    pub fn new(
        config: &NotificationConfig,
        notifier: Arc<dyn Notifier>,
        snapshots: Arc<dyn SnapshotProvider>,
        time: Arc<dyn TimeSource>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        Self {
            recipients: Mutex::new(RecipientList::new()),
            throttle: Mutex::new(NotificationThrottle::new(config.manual_cooldown_ms)),
            notifier,
            snapshots,
            time,
            telemetry,
            manual_in_flight: AtomicBool::new(false),
        }
    }

    pub fn add_recipient(&self, address: &str) -> Result<(), NotifyError> {
        lock_recover(&self.recipients).add(address)?;
        tracing::info!("[AlertDispatcher] Recipient added ({} total)", self.recipient_count());
        Ok(())
    }

    pub fn remove_recipient(&self, address: &str) -> bool {
        lock_recover(&self.recipients).remove(address)
    }

    pub fn recipients(&self) -> Vec<String> {
        lock_recover(&self.recipients).to_vec()
    }

    pub fn recipient_count(&self) -> usize {
        lock_recover(&self.recipients).len()
    }

    pub fn has_recipients(&self) -> bool {
        !lock_recover(&self.recipients).is_empty()
    }

    /// Remaining manual cooldown at the current time
    pub fn manual_retry_after_ms(&self) -> Option<u64> {
        lock_recover(&self.throttle).retry_after_ms(self.time.now_ms())
    }

    /// User-requested send.
    ///
    /// Denied when another manual send is in flight, when no recipients are
    /// configured, then when the cooldown has not elapsed. Only a successful
    /// delivery starts a new cooldown.
    pub async fn send_manual(&self) -> Result<(), NotifyError> {
        let result = self.try_send_manual().await;
        if let Err(err) = &result {
            if err.is_user_facing() {
                tracing::info!("[AlertDispatcher] Manual send denied: {}", err.message());
            } else {
                log_notify_error(err, "send_manual");
            }
        }
        result
    }

    async fn try_send_manual(&self) -> Result<(), NotifyError> {
        if self.manual_in_flight.swap(true, Ordering::SeqCst) {
            return Err(NotifyError::SendInProgress);
        }
        let _in_flight = InFlightGuard(&self.manual_in_flight);

        let now_ms = self.time.now_ms();
        let recipients = self.recipients();
        if recipients.is_empty() {
            return Err(NotifyError::EmptyRecipients);
        }
        lock_recover(&self.throttle).check(now_ms)?;

        let snapshot = self.snapshots.capture()?;
        let notification = Notification {
            recipients,
            snapshot,
            kind: AlertKind::Manual,
        };

        self.deliver(&notification, now_ms).await
    }

    /// Alarm-triggered send for `episode`; never consults the cooldown.
    ///
    /// Failures are logged and reported through telemetry. The caller does
    /// not retry.
    pub async fn send_alarm(&self, episode: u64) -> Result<(), NotifyError> {
        let now_ms = self.time.now_ms();
        let recipients = self.recipients();
        if recipients.is_empty() {
            tracing::warn!(
                "[AlertDispatcher] Alarm alert for episode {} skipped: no recipients",
                episode
            );
            self.telemetry.record(
                now_ms,
                SentinelEventKind::AlertSkipped {
                    episode,
                    reason: SkipReason::NoRecipients,
                },
            );
            return Err(NotifyError::EmptyRecipients);
        }

        let snapshot = match self.snapshots.capture() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_notify_error(&err, "send_alarm");
                self.telemetry.record(
                    now_ms,
                    SentinelEventKind::AlertSkipped {
                        episode,
                        reason: SkipReason::SnapshotUnavailable,
                    },
                );
                return Err(err);
            }
        };

        let notification = Notification {
            recipients,
            snapshot,
            kind: AlertKind::Alarm,
        };
        tracing::info!(
            "[AlertDispatcher] Sending alarm alert for episode {} to {} recipient(s)",
            episode,
            notification.recipients.len()
        );
        let result = self.deliver(&notification, now_ms).await;
        if let Err(err) = &result {
            log_notify_error(err, "send_alarm");
        }
        result
    }

    async fn deliver(&self, notification: &Notification, now_ms: u64) -> Result<(), NotifyError> {
        match self.notifier.send(notification).await {
            Ok(()) => {
                lock_recover(&self.throttle).record_success(now_ms);
                tracing::info!(
                    "[AlertDispatcher] {:?} alert delivered to {} recipient(s)",
                    notification.kind,
                    notification.recipients.len()
                );
                self.telemetry.record(
                    self.time.now_ms(),
                    SentinelEventKind::AlertDelivered {
                        kind: notification.kind,
                        recipients: notification.recipients.len(),
                    },
                );
                Ok(())
            }
            Err(cause) => {
                let err = NotifyError::delivery(&cause);
                self.telemetry.record(
                    self.time.now_ms(),
                    SentinelEventKind::AlertFailed {
                        kind: notification.kind,
                        code: err.code(),
                        cause: format!("{:#}", cause),
                    },
                );
                Err(err)
            }
        }
    }
}

/// Clears the in-flight flag when a manual send finishes or is cancelled.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::SystemTimeSource;
    use crate::notify::{RecordingNotifier, Snapshot, StaticSnapshot};
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Transport that holds every send until released
    #[derive(Default)]
    struct GatedNotifier {
        gate: Notify,
    }

    impl Notifier for GatedNotifier {
        fn send<'a>(&'a self, _notification: &'a Notification) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                self.gate.notified().await;
                Ok(())
            })
        }
    }

    struct Fixture {
        dispatcher: AlertDispatcher,
        notifier: Arc<RecordingNotifier>,
        telemetry: Arc<TelemetryCollector>,
    }

    fn fixture() -> Fixture {
        let notifier = Arc::new(RecordingNotifier::new());
        let telemetry = Arc::new(TelemetryCollector::default());
        let dispatcher = AlertDispatcher::new(
            &NotificationConfig::default(),
            notifier.clone(),
            Arc::new(StaticSnapshot::new(Snapshot::new("AAAA", "image/jpeg"))),
            Arc::new(SystemTimeSource::new()),
            telemetry.clone(),
        );
        Fixture {
            dispatcher,
            notifier,
            telemetry,
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_send_requires_recipients() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.send_manual().await,
            Err(NotifyError::EmptyRecipients)
        );
        assert_eq!(f.notifier.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_send_cooldown() {
        let f = fixture();
        f.dispatcher.add_recipient("ops@example.com").unwrap();

        f.dispatcher.send_manual().await.unwrap();
        advance(5000).await;
        assert_eq!(
            f.dispatcher.send_manual().await,
            Err(NotifyError::CooldownActive {
                retry_after_ms: 5000
            })
        );
        advance(5001).await;
        f.dispatcher.send_manual().await.unwrap();
        assert_eq!(f.notifier.sent_count(), 2);
        assert_eq!(f.notifier.sent()[0].kind, AlertKind::Manual);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_manual_send_does_not_start_cooldown() {
        let f = fixture();
        f.dispatcher.add_recipient("ops@example.com").unwrap();
        f.notifier.fail_next("smtp unreachable");

        let err = f.dispatcher.send_manual().await.unwrap_err();
        assert!(matches!(err, NotifyError::DeliveryFailure { ref cause } if cause.contains("smtp unreachable")));
        assert_eq!(f.dispatcher.manual_retry_after_ms(), None);

        f.dispatcher.send_manual().await.unwrap();
        assert_eq!(f.notifier.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_send_bypasses_cooldown_but_stamps_it() {
        let f = fixture();
        f.dispatcher.add_recipient("ops@example.com").unwrap();

        f.dispatcher.send_manual().await.unwrap();
        f.dispatcher.send_alarm(1).await.unwrap();
        assert_eq!(f.notifier.sent_count(), 2);
        assert!(f.notifier.sent()[1].is_alarm());

        advance(3000).await;
        assert_eq!(f.dispatcher.manual_retry_after_ms(), Some(7000));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_alarm_send_is_reported() {
        let f = fixture();
        f.dispatcher.add_recipient("ops@example.com").unwrap();
        f.notifier.fail_next("mailbox full");

        assert!(f.dispatcher.send_alarm(3).await.is_err());
        let failures = f
            .telemetry
            .recent_matching(|kind| matches!(kind, SentinelEventKind::AlertFailed { .. }));
        assert_eq!(failures.len(), 1);
        assert_eq!(f.dispatcher.manual_retry_after_ms(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_manual_send_is_refused() {
        let notifier = Arc::new(GatedNotifier::default());
        let dispatcher = Arc::new(AlertDispatcher::new(
            &NotificationConfig::default(),
            notifier.clone(),
            Arc::new(StaticSnapshot::new(Snapshot::new("AAAA", "image/jpeg"))),
            Arc::new(SystemTimeSource::new()),
            Arc::new(TelemetryCollector::default()),
        ));
        dispatcher.add_recipient("ops@example.com").unwrap();

        let first = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.send_manual().await }
        });
        advance(1).await;
        assert!(!first.is_finished());
        assert_eq!(
            dispatcher.send_manual().await,
            Err(NotifyError::SendInProgress)
        );

        notifier.gate.notify_one();
        assert_eq!(first.await.unwrap(), Ok(()));

        // Flag cleared: the next refusal comes from the cooldown
        assert!(matches!(
            dispatcher.send_manual().await,
            Err(NotifyError::CooldownActive { .. })
        ));
    }
}
